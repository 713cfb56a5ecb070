use hostverify::{Host, HostSpec, Inventory, Transport};
use std::path::Path;
use tokio::time::Duration;

fn fixtures_path() -> &'static Path {
    Path::new("tests/fixtures/inventory")
}

#[test]
fn test_molecule_inventory() {
    let inv = Inventory::load_ansible(fixtures_path().join("molecule.yml")).unwrap();

    assert_eq!(inv.len(), 1);
    let host = &inv.hosts()[0];
    assert_eq!(host.name, "instance");
    assert_eq!(host.transport, Transport::Docker { container: "funkwhale-instance".into() });
    assert!(!host.become_root);
}

#[test]
fn test_nested_groups_sorted_by_name() {
    let inv = Inventory::load_ansible(fixtures_path().join("staging.yml")).unwrap();

    let names: Vec<&str> = inv.hosts().iter().map(|h| h.name.as_str()).collect();
    assert_eq!(names, vec!["controller", "music1.example.org", "music2.example.org"]);

    assert_eq!(inv.hosts()[0].transport, Transport::Local);
    assert!(!inv.hosts()[0].become_root);

    assert_eq!(inv.hosts()[1].transport, Transport::Ssh {
        host: "music1.example.org".into(),
        user: Some("deploy".into()),
        port: None,
    });
    assert!(inv.hosts()[1].become_root);

    assert_eq!(inv.hosts()[2].transport, Transport::Ssh {
        host: "10.0.0.12".into(),
        user: Some("deploy".into()),
        port: Some(2222),
    });
}

#[test]
fn test_with_become_applies_to_every_host() {
    let inv = Inventory::load_ansible(fixtures_path().join("staging.yml")).unwrap().with_become();
    assert!(inv.hosts().iter().all(|h| h.become_root));
}

#[test]
fn test_missing_inventory_file() {
    let err = Inventory::load_ansible(fixtures_path().join("absent.yml")).unwrap_err();
    assert!(err.to_string().contains("absent.yml"));
}

#[test]
fn test_connect_keeps_label_and_transport() {
    let spec = HostSpec::parse_uri("ssh://deploy@music.example.org:2222").unwrap();
    let host = spec.connect(Duration::from_secs(5));

    assert_eq!(host.label(), "music.example.org");
    assert_eq!(host.transport().describe(), "ssh://deploy@music.example.org:2222");
}

#[tokio::test]
async fn test_local_host_answers_queries() {
    let dir = tempfile::tempdir().unwrap();
    let env = dir.path().join(".env");
    std::fs::write(&env, "CACHE_URL=redis://127.0.0.1:6379/0\n").unwrap();

    let host = HostSpec::local().connect(Duration::from_secs(10));
    let info = host.file(&env.to_string_lossy()).await.unwrap();
    assert!(info.exists);
    assert!(!info.is_directory);

    let out = host.run("printf hello").await.unwrap();
    assert_eq!(out.stdout, "hello");
}
