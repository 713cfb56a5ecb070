use hostverify::{builtin_names, CheckKind, HostVerifyError, SuiteLoader};
use std::fs;
use std::path::Path;

fn fixtures_path() -> &'static Path {
    Path::new("tests/fixtures")
}

#[test]
fn test_load_dir_reads_yaml_and_yml() {
    let loader = SuiteLoader::new();
    let suites = loader.load_dir(fixtures_path().join("suites")).unwrap();

    let names: Vec<&str> = suites.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names.len(), 2);
    assert!(names.contains(&"web"));
    assert!(names.contains(&"storage"));
}

#[test]
fn test_load_file_expands_vars() {
    let loader = SuiteLoader::new();
    let suite = loader.load_file(fixtures_path().join("suites/web.yaml")).unwrap();

    assert_eq!(suite.description.as_deref(), Some("Reverse proxy in front of the api"));
    assert!(suite.source.as_deref().unwrap().ends_with("web.yaml"));
    assert_eq!(suite.checks.len(), 2);
    assert_eq!(suite.checks[0].name, "service nginx");

    match &suite.checks[1].check {
        CheckKind::FileMatches { path, patterns } => {
            assert_eq!(path, "/etc/nginx/sites-enabled/music.example.org.conf");
            assert_eq!(patterns.len(), 2);
        }
        other => panic!("unexpected check {:?}", other),
    }
}

#[test]
fn test_mapping_items_expand() {
    let loader = SuiteLoader::new();
    let suite = loader.load_file(fixtures_path().join("suites/storage.yml")).unwrap();

    assert_eq!(suite.checks.len(), 2);
    assert_eq!(suite.checks[1].name, "owner /srv/funkwhale/data/music");
    assert_eq!(suite.checks[1].check.target(), "/srv/funkwhale/data/music");
}

#[test]
fn test_duplicate_after_expansion_rejected() {
    let loader = SuiteLoader::new();
    let err = loader.load_file(fixtures_path().join("broken/duplicate.yaml")).unwrap_err();

    match err {
        HostVerifyError::DuplicateCheck { suite, name } => {
            assert_eq!(suite, "duplicate");
            assert_eq!(name, "service nginx");
        }
        other => panic!("unexpected error {}", other),
    }
}

#[test]
fn test_unknown_check_type_rejected() {
    let loader = SuiteLoader::new();
    let err = loader.load_file(fixtures_path().join("broken/unknown_type.yaml")).unwrap_err();
    assert!(matches!(err, HostVerifyError::SuiteParse(_)));
    assert!(err.to_string().contains("sysctl"));
}

#[test]
fn test_unresolved_var_rejected() {
    let loader = SuiteLoader::new();
    let err = loader.load_file(fixtures_path().join("broken/unresolved.yaml")).unwrap_err();
    assert!(err.to_string().contains("{vars.root}"));
}

#[test]
fn test_missing_file() {
    let loader = SuiteLoader::new();
    let err = loader.load_file(fixtures_path().join("suites/absent.yaml")).unwrap_err();
    assert!(matches!(err, HostVerifyError::SuiteFileNotFound(_)));
}

#[test]
fn test_load_any_resolves_dir_file_and_builtin() {
    let loader = SuiteLoader::new();

    assert_eq!(loader.load_any("tests/fixtures/suites").unwrap().len(), 2);
    assert_eq!(loader.load_any("tests/fixtures/suites/web.yaml").unwrap()[0].name, "web");

    let builtin = loader.load_any("funkwhale").unwrap();
    assert_eq!(builtin[0].source.as_deref(), Some("builtin:funkwhale"));

    assert!(loader.load_any("no-such-suite").is_err());
}

#[test]
fn test_builtins_all_load() {
    let loader = SuiteLoader::new();
    for name in builtin_names() {
        let suite = loader.load_builtin(name).unwrap();
        assert_eq!(suite.name, name);
        assert!(suite.checks.len() > 20);
    }
}

#[test]
fn test_builtin_frontend_paths_differ() {
    let loader = SuiteLoader::new();
    let front = loader.load_builtin("funkwhale").unwrap();
    let frontend = loader.load_builtin("funkwhale-frontend").unwrap();

    let index = |suite: &hostverify::Suite| {
        suite.checks.iter().find(|c| c.name == "frontend downloaded").unwrap().check.target().to_string()
    };
    assert_eq!(index(&front), "/srv/funkwhale/front/dist/index.html");
    assert_eq!(index(&frontend), "/srv/funkwhale/frontend/dist/index.html");
}

#[test]
fn test_builtin_expands_seven_services() {
    let suite = SuiteLoader::new().load_builtin("funkwhale").unwrap();
    let services: Vec<&str> = suite
        .checks
        .iter()
        .filter(|c| c.check.kind_name() == "service")
        .map(|c| c.check.target())
        .collect();

    assert_eq!(services, vec![
        "redis-server", "postgresql", "nginx",
        "funkwhale-server", "funkwhale-worker", "funkwhale-beat", "funkwhale.target",
    ]);
}

#[test]
fn test_retain_matching() {
    let mut suite = SuiteLoader::new().load_builtin("funkwhale").unwrap();
    suite.retain_matching("directory");
    assert_eq!(suite.checks.len(), 4);
}

#[test]
fn test_load_from_temp_dir() {
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir(dir.path().join("nested")).unwrap();
    fs::write(
        dir.path().join("nested/certbot.yaml"),
        "name: certbot\nchecks:\n  - name: certbot\n    type: command_path\n    command: certbot-auto\n    expected: /usr/local/bin/certbot-auto\n",
    )
    .unwrap();
    fs::write(dir.path().join("notes.txt"), "not a suite").unwrap();

    let suites = SuiteLoader::new().load_dir(dir.path()).unwrap();
    assert_eq!(suites.len(), 1);
    assert_eq!(suites[0].checks[0].check.kind_name(), "command_path");
}

#[test]
fn test_empty_suite_rejected() {
    let err = SuiteLoader::new().parse_str("name: empty\nchecks: []\n", "inline").unwrap_err();
    assert!(err.to_string().contains("defines no checks"));
}
