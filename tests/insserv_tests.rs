//! End-to-end tests running insserv over temporary init directories

use buckos_insserv::{
    DependencyOrder, Engine, Error, LinkAction, OrderingService, Provision, RunConfig, RunReport,
    Runlevel, Scheduled, Target,
};
use std::os::unix::fs::{symlink, PermissionsExt};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Create an empty init directory
fn create_init_dir() -> TempDir {
    TempDir::new().expect("Failed to create temp dir")
}

/// Write an executable init script
fn script(root: &Path, name: &str, body: &str) {
    let path = root.join(name);
    std::fs::write(&path, body).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
}

/// Create a runlevel link to `../target`
fn link(root: &Path, dir: &str, name: &str, target: &str) {
    let dir = root.join(dir);
    std::fs::create_dir_all(&dir).unwrap();
    symlink(format!("../{}", target), dir.join(name)).unwrap();
}

/// Sorted link names of a runlevel directory
fn links(root: &Path, dir: &str) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(root.join(dir))
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
        .collect();
    names.sort();
    names
}

fn config(root: &Path) -> RunConfig {
    let mut config = RunConfig::new(root);
    config.facility_file = root.join("insserv.conf");
    config
}

fn run(config: RunConfig, targets: &[&str]) -> buckos_insserv::Result<RunReport> {
    let targets = targets.iter().map(|t| Target::parse(t)).collect();
    Engine::new(config, targets).run()
}

/// Default ordering with some services pinned to fixed orders after sorting
struct PinnedOrder {
    inner: DependencyOrder,
    pins: Vec<(&'static str, u32)>,
}

impl PinnedOrder {
    fn new(pins: &[(&'static str, u32)]) -> Self {
        Self {
            inner: DependencyOrder::new(),
            pins: pins.to_vec(),
        }
    }
}

impl OrderingService for PinnedOrder {
    fn declare_edge(&mut self, from: &str, to: &str) {
        self.inner.declare_edge(from, to)
    }

    fn declare_provider(&mut self, name: &str, script: &str) -> Provision {
        self.inner.declare_provider(name, script)
    }

    fn declare_virtual(&mut self, name: &str, replacement: &str) {
        self.inner.declare_virtual(name, replacement)
    }

    fn declare_runlevels(&mut self, name: &str, levels: &str) {
        self.inner.declare_runlevels(name, levels)
    }

    fn sort(&mut self) -> buckos_insserv::Result<()> {
        self.inner.sort()?;
        for &(name, order) in &self.pins {
            self.inner.set_order(name, order);
        }
        Ok(())
    }

    fn get_order(&self, name: &str) -> u32 {
        self.inner.get_order(name)
    }

    fn set_order(&mut self, name: &str, order: u32) {
        self.inner.set_order(name, order)
    }

    fn max_order(&self) -> u32 {
        self.inner.max_order()
    }

    fn iterate(&self, level: Runlevel) -> Vec<Scheduled> {
        self.inner.iterate(level)
    }

    fn is_excluded_by_default(&self, script: &str, level: Runlevel) -> bool {
        self.inner.is_excluded_by_default(script, level)
    }
}

fn network_and_web(root: &Path) {
    script(
        root,
        "network",
        "#!/bin/sh\n### BEGIN INIT INFO\n# Provides: network\n# Default-Start: 2 3 5\n### END INIT INFO\n",
    );
    script(
        root,
        "web",
        "#!/bin/sh\n### BEGIN INIT INFO\n# Provides: web\n# Required-Start: network\n# Default-Start: 3 5\n# Description: Web server\n### END INIT INFO\n",
    );
}

mod install {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_full_run_creates_ordered_links() {
        let tmp = create_init_dir();
        let root = tmp.path();
        network_and_web(root);

        let report = run(config(root), &[]).unwrap();
        assert_eq!(report.max_order, 6);

        assert_eq!(links(root, "rc2.d"), vec!["K95network", "S05network"]);
        for dir in ["rc3.d", "rc5.d"] {
            assert_eq!(
                links(root, dir),
                vec!["K94web", "K95network", "S05network", "S06web"]
            );
        }
        for dir in ["rc0.d", "rc1.d", "rc4.d", "rc6.d", "rcS.d", "boot.d"] {
            assert!(links(root, dir).is_empty(), "{}", dir);
        }
        assert_eq!(
            std::fs::read_link(root.join("rc3.d/S06web")).unwrap(),
            PathBuf::from("../web")
        );
    }

    #[test]
    fn test_target_starts_after_live_dependency() {
        let tmp = create_init_dir();
        let root = tmp.path();
        network_and_web(root);
        for dir in ["rc3.d", "rc5.d"] {
            link(root, dir, "S10network", "network");
            link(root, dir, "K90network", "network");
        }

        run(config(root), &["web"]).unwrap();

        for dir in ["rc3.d", "rc5.d"] {
            let names = links(root, dir);
            let order = |prefix: &str, name: &str| -> u32 {
                let entry = names
                    .iter()
                    .find(|n| n.starts_with(prefix) && n.ends_with(name))
                    .unwrap_or_else(|| panic!("no {} link for {} in {}", prefix, name, dir));
                entry[1..3].parse().unwrap()
            };
            let web = order("S", "web");
            assert!(web > order("S", "network"));
            assert_eq!(order("K", "web"), 100 - web);
        }
        // Kill links never land in the one-way runlevels
        assert!(links(root, "rc0.d").is_empty());
        assert!(links(root, "rc6.d").is_empty());
    }

    #[test]
    fn test_second_run_changes_nothing() {
        let tmp = create_init_dir();
        let root = tmp.path();
        network_and_web(root);

        let first = run(config(root), &[]).unwrap();
        assert!(!first.is_empty());

        let second = run(config(root), &[]).unwrap();
        assert_eq!(second.actions, Vec::<LinkAction>::new());
        let third = run(config(root), &["web"]).unwrap();
        assert!(third.is_empty());
    }

    #[test]
    fn test_script_without_header_defaults_to_3_and_5() {
        let tmp = create_init_dir();
        let root = tmp.path();
        script(root, "plain", "#!/bin/sh\necho started\n");

        run(config(root), &["plain"]).unwrap();

        assert_eq!(links(root, "rc3.d"), vec!["K99plain", "S01plain"]);
        assert_eq!(links(root, "rc5.d"), vec!["K99plain", "S01plain"]);
        assert!(links(root, "rc2.d").is_empty());
    }

    #[test]
    fn test_facility_dependency() {
        let tmp = create_init_dir();
        let root = tmp.path();
        std::fs::write(root.join("insserv.conf"), "# facilities\n$net network\n").unwrap();
        script(root, "network", "# Provides: network\n# Default-Start: 3\n");
        script(root, "cron", "# Provides: cron\n# Default-Start: 3\n");
        script(
            root,
            "mail",
            "# Provides: mail\n# Required-Start: $net +cron\n# Default-Start: 3\n",
        );

        run(config(root), &[]).unwrap();

        // network is pinned to 5, mail follows it
        assert_eq!(
            links(root, "rc3.d"),
            vec!["K94mail", "K95network", "K99cron", "S01cron", "S05network", "S06mail"]
        );
    }

    #[test]
    fn test_optional_dependency_does_not_block() {
        let tmp = create_init_dir();
        let root = tmp.path();
        script(
            root,
            "web",
            "# Provides: web\n# Required-Start: +database\n# Default-Start: 3\n",
        );

        run(config(root), &["web"]).unwrap();
        assert_eq!(links(root, "rc3.d"), vec!["K99web", "S01web"]);
    }

    #[test]
    fn test_missing_required_service_aborts() {
        let tmp = create_init_dir();
        let root = tmp.path();
        script(
            root,
            "web",
            "# Provides: web\n# Required-Start: database\n# Default-Start: 3\n",
        );

        match run(config(root), &["web"]) {
            Err(Error::Dependency { service }) => assert_eq!(service, "web"),
            other => panic!("expected dependency error, got {:?}", other.map(|r| r.actions)),
        }
        assert!(links(root, "rc3.d").is_empty());

        let mut forced = config(root);
        forced.force = true;
        run(forced, &["web"]).unwrap();
        assert_eq!(links(root, "rc3.d"), vec!["K99web", "S01web"]);
    }

    #[test]
    fn test_dependency_cycle_is_fatal() {
        let tmp = create_init_dir();
        let root = tmp.path();
        script(root, "a", "# Provides: a\n# Should-Start: b\n# Default-Start: 3\n");
        script(root, "b", "# Provides: b\n# Should-Start: a\n# Default-Start: 3\n");

        assert!(matches!(
            run(config(root), &[]),
            Err(Error::DependencyCycle(_))
        ));
        assert!(links(root, "rc3.d").is_empty());
    }

    #[test]
    fn test_full_run_checks_required_services() {
        let tmp = create_init_dir();
        let root = tmp.path();
        script(
            root,
            "web",
            "# Provides: web\n# Required-Start: database\n# Default-Start: 3\n",
        );

        match run(config(root), &[]) {
            Err(Error::Dependency { service }) => assert_eq!(service, "web"),
            other => panic!("expected dependency error, got {:?}", other.map(|r| r.actions)),
        }
        assert!(links(root, "rc3.d").is_empty());

        let mut forced = config(root);
        forced.force = true;
        run(forced, &[]).unwrap();
        assert_eq!(links(root, "rc3.d"), vec!["K99web", "S01web"]);
    }

    #[test]
    fn test_target_placed_after_pinned_dependency() {
        let tmp = create_init_dir();
        let root = tmp.path();
        script(root, "network", "# Provides: network\n# Default-Start: 3 5\n");
        script(
            root,
            "web",
            "# Provides: web\n# Required-Start: network\n# Default-Start: 3 5\n",
        );
        for dir in ["rc3.d", "rc5.d"] {
            link(root, dir, "S10network", "network");
            link(root, dir, "K90network", "network");
        }

        let ordering = PinnedOrder::new(&[("network", 10)]);
        let report = Engine::with_ordering(config(root), vec![Target::new("web")], ordering)
            .run()
            .unwrap();

        assert_eq!(report.max_order, 11);
        for dir in ["rc3.d", "rc5.d"] {
            assert_eq!(
                links(root, dir),
                vec!["K89web", "K90network", "S10network", "S11web"]
            );
        }
        for dir in ["rc0.d", "rc2.d", "rc6.d"] {
            assert!(links(root, dir).is_empty(), "{}", dir);
        }
    }
}

mod guessing {
    use super::*;
    use pretty_assertions::assert_eq;

    fn linked_network(root: &Path) {
        script(root, "network", "# Provides: network\n# Default-Start: 3\n");
        link(root, "rc3.d", "S05network", "network");
        link(root, "rc3.d", "K95network", "network");
    }

    #[test]
    fn test_headerless_script_depends_on_earlier_link() {
        let tmp = create_init_dir();
        let root = tmp.path();
        linked_network(root);
        script(root, "foo", "#!/bin/sh\nexec foo\n");
        link(root, "rc3.d", "S08foo", "foo");

        run(config(root), &[]).unwrap();
        assert_eq!(
            links(root, "rc3.d"),
            vec!["K94foo", "K95network", "S05network", "S06foo"]
        );

        let second = run(config(root), &[]).unwrap();
        assert!(second.is_empty());
    }

    #[test]
    fn test_empty_required_start_blocks_guess() {
        let tmp = create_init_dir();
        let root = tmp.path();
        linked_network(root);
        script(root, "foo", "#!/bin/sh\n# Required-Start:\n");
        link(root, "rc3.d", "S08foo", "foo");

        run(config(root), &[]).unwrap();
        assert_eq!(
            links(root, "rc3.d"),
            vec!["K95network", "K99foo", "S01foo", "S05network"]
        );
    }

    #[test]
    fn test_headerless_script_takes_levels_of_dependent() {
        let tmp = create_init_dir();
        let root = tmp.path();
        script(
            root,
            "nfs",
            "# Provides: nfs\n# Required-Start: portmap\n# Default-Start: 2 3\n",
        );
        script(root, "portmap", "#!/bin/sh\n");
        for dir in ["rc2.d", "rc3.d"] {
            link(root, dir, "S01nfs", "nfs");
            link(root, dir, "K99nfs", "nfs");
        }

        run(config(root), &[]).unwrap();

        for dir in ["rc2.d", "rc3.d"] {
            assert_eq!(
                links(root, dir),
                vec!["K98nfs", "K99portmap", "S01portmap", "S02nfs"]
            );
        }
        // Not the 3 5 fallback
        assert!(links(root, "rc5.d").is_empty());
    }

}

mod remove {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_remove_required_service_aborts() {
        let tmp = create_init_dir();
        let root = tmp.path();
        network_and_web(root);
        run(config(root), &[]).unwrap();
        let before = links(root, "rc3.d");

        let mut removal = config(root);
        removal.remove = true;
        match run(removal, &["network"]) {
            Err(Error::Dependency { service }) => assert_eq!(service, "network"),
            other => panic!("expected dependency error, got {:?}", other.map(|r| r.actions)),
        }
        assert_eq!(links(root, "rc3.d"), before);
    }

    #[test]
    fn test_forced_remove() {
        let tmp = create_init_dir();
        let root = tmp.path();
        network_and_web(root);
        run(config(root), &[]).unwrap();

        let mut removal = config(root);
        removal.remove = true;
        removal.force = true;
        run(removal, &["network"]).unwrap();

        assert!(links(root, "rc2.d").is_empty());
        assert_eq!(links(root, "rc3.d"), vec!["K94web", "S06web"]);
        assert_eq!(links(root, "rc5.d"), vec!["K94web", "S06web"]);
    }

    #[test]
    fn test_remove_unused_service() {
        let tmp = create_init_dir();
        let root = tmp.path();
        network_and_web(root);
        run(config(root), &[]).unwrap();

        let mut removal = config(root);
        removal.remove = true;
        run(removal, &["web"]).unwrap();

        assert_eq!(links(root, "rc3.d"), vec!["K95network", "S05network"]);
        assert_eq!(links(root, "rc2.d"), vec!["K95network", "S05network"]);
    }
}

mod cleanup {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_dangling_links_removed() {
        let tmp = create_init_dir();
        let root = tmp.path();
        script(root, "web", "# Provides: web\n# Default-Start: 3\n");
        link(root, "rc3.d", "S01gone", "gone");
        link(root, "rc3.d", "K99gone", "gone");

        run(config(root), &[]).unwrap();
        assert_eq!(links(root, "rc3.d"), vec!["K99web", "S01web"]);
    }

    #[test]
    fn test_defaults_mode_drops_unrequested_levels() {
        let tmp = create_init_dir();
        let root = tmp.path();
        script(root, "web", "# Provides: web\n# Default-Start: 3\n");
        link(root, "rc2.d", "S01web", "web");
        link(root, "rc2.d", "K99web", "web");

        // Without defaults mode the old links stay
        run(config(root), &[]).unwrap();
        assert_eq!(links(root, "rc2.d"), vec!["K99web", "S01web"]);
        assert_eq!(links(root, "rc3.d"), vec!["K99web", "S01web"]);

        let mut defaults = config(root);
        defaults.defaults = true;
        run(defaults, &[]).unwrap();
        assert!(links(root, "rc2.d").is_empty());
        assert_eq!(links(root, "rc3.d"), vec!["K99web", "S01web"]);
    }

    #[test]
    fn test_dry_run_touches_nothing() {
        let tmp = create_init_dir();
        let root = tmp.path();
        network_and_web(root);
        link(root, "rc3.d", "S01gone", "gone");

        let mut dry = config(root);
        dry.dry_run = true;
        let report = run(dry, &[]).unwrap();

        assert!(report.actions.contains(&LinkAction::Remove {
            dir: root.join("rc3.d"),
            name: "S01gone".into(),
        }));
        assert!(report.actions.contains(&LinkAction::Create {
            dir: root.join("rc5.d"),
            name: "S06web".into(),
            target: "../web".into(),
        }));
        assert_eq!(links(root, "rc3.d"), vec!["S01gone"]);
        assert!(!root.join("rc5.d").exists());

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["max_order"], 6);
        assert_eq!(json["actions"][0]["action"], "remove");
    }
}
