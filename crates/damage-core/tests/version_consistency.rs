//! Every workspace crate must inherit the workspace version.

use std::path::{Path, PathBuf};

fn workspace_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .ancestors()
        .nth(2)
        .unwrap()
        .to_path_buf()
}

fn read_manifest(path: &Path) -> toml::Value {
    let raw = std::fs::read_to_string(path.join("Cargo.toml")).unwrap();
    raw.parse().unwrap()
}

#[test]
fn members_inherit_workspace_version() {
    let root = workspace_root();
    let workspace = read_manifest(&root);
    let members = workspace["workspace"]["members"].as_array().unwrap();
    assert!(!members.is_empty());

    for member in members {
        let member = member.as_str().unwrap();
        let manifest = read_manifest(&root.join(member));
        let inherits = manifest["package"]["version"]
            .get("workspace")
            .and_then(|v| v.as_bool())
            == Some(true);
        assert!(inherits, "{member} should use version.workspace = true");
    }
}

#[test]
fn workspace_version_matches_cargo_pkg() {
    let workspace = read_manifest(&workspace_root());
    let version = workspace["workspace"]["package"]["version"]
        .as_str()
        .unwrap();
    assert_eq!(version, env!("CARGO_PKG_VERSION"));
}
