use std::collections::HashMap;
use std::path::PathBuf;

use discord_rpc_ipc::transport::discovery::{PathResolver, FALLBACK_DIR, SANDBOX_SUBDIRS};
#[cfg(unix)]
use discord_rpc_ipc::AppError;

fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let vars: HashMap<String, String> = vars
        .iter()
        .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
        .collect();
    move |key| vars.get(key).cloned()
}

#[test]
fn fallback_dir_is_always_last() {
    let resolver = PathResolver::from_lookup(lookup(&[]));
    assert_eq!(resolver.base_dirs(), &[PathBuf::from(FALLBACK_DIR)]);
}

#[test]
fn env_dirs_keep_priority_order() {
    let resolver = PathResolver::from_lookup(lookup(&[
        ("TEMP", "/temp"),
        ("XDG_RUNTIME_DIR", "/run/user/1000"),
        ("TMPDIR", "/var/tmp"),
    ]));

    assert_eq!(
        resolver.base_dirs(),
        &[
            PathBuf::from("/run/user/1000"),
            PathBuf::from("/var/tmp"),
            PathBuf::from("/temp"),
            PathBuf::from(FALLBACK_DIR),
        ]
    );
}

#[test]
fn empty_and_duplicate_dirs_are_skipped() {
    let resolver = PathResolver::from_lookup(lookup(&[
        ("XDG_RUNTIME_DIR", ""),
        ("TMPDIR", "/tmp"),
        ("TMP", "/scratch"),
        ("TEMP", "/scratch"),
    ]));

    assert_eq!(
        resolver.base_dirs(),
        &[PathBuf::from("/tmp"), PathBuf::from("/scratch")]
    );
}

#[test]
fn candidate_dirs_follow_each_base_with_sandbox_dirs() {
    let resolver = PathResolver::with_base_dirs(vec![PathBuf::from("/a"), PathBuf::from("/b")]);
    let candidates = resolver.candidate_dirs();

    let mut expected = Vec::new();
    for base in ["/a", "/b"] {
        expected.push(PathBuf::from(base));
        for sub in SANDBOX_SUBDIRS {
            expected.push(PathBuf::from(base).join(sub));
        }
    }
    assert_eq!(candidates, expected);
}

#[cfg(unix)]
#[test]
fn empty_directory_is_discovery_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let resolver = PathResolver::with_base_dirs(vec![dir.path().to_path_buf()]);

    let err = resolver.resolve().expect_err("nothing to find");
    match err {
        AppError::Discovery(msg) => {
            assert!(msg.contains("discord-ipc-"), "got: {msg}");
            assert!(msg.contains(&dir.path().display().to_string()), "got: {msg}");
        }
        other => panic!("expected Discovery error, got {other:?}"),
    }
}

#[cfg(unix)]
#[test]
fn lowest_index_in_directory_wins() {
    let dir = tempfile::tempdir().expect("tempdir");
    std::fs::write(dir.path().join("discord-ipc-7"), b"").expect("endpoint");
    std::fs::write(dir.path().join("discord-ipc-3"), b"").expect("endpoint");
    let resolver = PathResolver::with_base_dirs(vec![dir.path().to_path_buf()]);

    assert_eq!(
        resolver.resolve().expect("found"),
        dir.path().join("discord-ipc-3")
    );
}

#[cfg(unix)]
#[test]
fn first_directory_with_an_endpoint_wins() {
    let first = tempfile::tempdir().expect("tempdir");
    let second = tempfile::tempdir().expect("tempdir");
    std::fs::write(first.path().join("discord-ipc-9"), b"").expect("endpoint");
    std::fs::write(second.path().join("discord-ipc-0"), b"").expect("endpoint");
    let resolver = PathResolver::with_base_dirs(vec![
        first.path().to_path_buf(),
        second.path().to_path_buf(),
    ]);

    assert_eq!(
        resolver.resolve().expect("found"),
        first.path().join("discord-ipc-9")
    );
}

#[cfg(unix)]
#[test]
fn index_ten_is_not_probed() {
    let dir = tempfile::tempdir().expect("tempdir");
    std::fs::write(dir.path().join("discord-ipc-10"), b"").expect("endpoint");
    let resolver = PathResolver::with_base_dirs(vec![dir.path().to_path_buf()]);

    assert!(resolver.resolve().is_err());
}

#[cfg(unix)]
#[test]
fn flatpak_subdirectory_is_probed() {
    let dir = tempfile::tempdir().expect("tempdir");
    let sandbox = dir.path().join("app/com.discordapp.Discord");
    std::fs::create_dir_all(&sandbox).expect("sandbox dir");
    std::fs::write(sandbox.join("discord-ipc-0"), b"").expect("endpoint");
    let resolver = PathResolver::with_base_dirs(vec![dir.path().to_path_buf()]);

    assert_eq!(resolver.resolve().expect("found"), sandbox.join("discord-ipc-0"));
}

/// Reads the real process environment.
///
/// NOTE: mutates process-global env vars and must run serially.
#[cfg(unix)]
#[test]
#[serial_test::serial]
#[allow(unsafe_code)]
fn from_env_uses_xdg_runtime_dir_first() {
    let dir = tempfile::tempdir().expect("tempdir");
    std::fs::write(dir.path().join("discord-ipc-1"), b"").expect("endpoint");

    let previous = std::env::var("XDG_RUNTIME_DIR").ok();
    unsafe {
        std::env::set_var("XDG_RUNTIME_DIR", dir.path());
    }

    let resolver = PathResolver::from_env();

    unsafe {
        match previous {
            Some(value) => std::env::set_var("XDG_RUNTIME_DIR", value),
            None => std::env::remove_var("XDG_RUNTIME_DIR"),
        }
    }

    assert_eq!(resolver.base_dirs().first(), Some(&dir.path().to_path_buf()));
    assert_eq!(
        resolver.resolve().expect("found"),
        dir.path().join("discord-ipc-1")
    );
}
