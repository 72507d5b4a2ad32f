use std::borrow::Cow;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};

/// Resolve a command path the way a typical shell would.
///
/// Behavior:
/// - Absolute path: returns it if it names a file.
/// - Relative with multiple components (e.g., `bin/sh`): returns it if it names a file.
/// - `./foo`: returns it if it names a file.
/// - Single path component (no separators): search each directory in `search_paths` (PATH)
///   and return the first file found.
/// - Empty path: returns `None`.
///
/// Whether the file is actually executable is left to `execve`, so the
/// caller can tell "not found" from "not executable".
pub fn find_command_path<'a>(search_paths: &OsStr, path: &'a Path) -> Option<Cow<'a, Path>> {
    if path.is_absolute() {
        return find_by_path(path).map(Cow::Borrowed);
    }

    if path.starts_with("./") {
        return find_by_path(path).map(Cow::Borrowed);
    }

    let mut components = path.components();
    let first = components.next();
    let second = components.next();
    match (first, second) {
        (None, None) => None,
        (Some(x), None) => find_in_path(search_paths, x.as_os_str()).map(Cow::Owned),
        _ => find_by_path(path).map(Cow::Borrowed),
    }
}

fn find_in_path(search_paths: &OsStr, cmd: &OsStr) -> Option<PathBuf> {
    std::env::split_paths(search_paths)
        .map(|dir| dir.join(cmd))
        .find(|candidate| candidate.is_file())
}

fn find_by_path(path: &Path) -> Option<&Path> {
    if path.is_file() { Some(path) } else { None }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{lock_process, make_unique_temp_dir};
    use std::fs;
    use std::fs::File;

    fn osstr(s: &str) -> &OsStr {
        OsStr::new(s)
    }

    #[test]
    fn absolute_existing() {
        let path = Path::new("/bin/sh");
        let found = find_command_path(osstr("/nowhere"), path).expect("Expected to find /bin/sh");
        assert_eq!(found.as_ref(), path);
    }

    #[test]
    fn absolute_nonexisting() {
        let res = find_command_path(osstr("/bin"), Path::new("/bin/nonexisting"));
        assert!(res.is_none());
    }

    #[test]
    fn directories_are_not_commands() {
        assert!(find_command_path(osstr("/"), Path::new("/tmp")).is_none());
        assert!(find_command_path(osstr("/"), Path::new("tmp")).is_none());
    }

    #[test]
    fn single_component_found_in_path() {
        let found = find_command_path(osstr("/nonexistent/dir:/bin"), Path::new("sh"))
            .expect("Expected to find 'sh' in /bin via PATH search");
        assert_eq!(found.as_ref(), Path::new("/bin/sh"));
    }

    #[test]
    fn first_path_entry_wins() {
        let first = make_unique_temp_dir("external_first");
        let second = make_unique_temp_dir("external_second");
        File::create(first.join("tool")).unwrap();
        File::create(second.join("tool")).unwrap();

        let search = std::env::join_paths([&first, &second]).unwrap();
        let found = find_command_path(&search, Path::new("tool")).unwrap();
        assert_eq!(found.as_ref(), first.join("tool"));

        let _ = fs::remove_dir_all(first);
        let _ = fs::remove_dir_all(second);
    }

    #[test]
    fn single_component_not_found_in_path() {
        let res = find_command_path(osstr("/bin"), Path::new("nonexisting"));
        assert!(res.is_none(), "Expected not to find 'nonexisting' in PATH");
    }

    #[test]
    fn multiple_components_relative_existing() {
        let _lock = lock_process();
        let cwd_before = std::env::current_dir().expect("cwd");
        let tmp_base = make_unique_temp_dir("external_relative");
        fs::create_dir_all(tmp_base.join("bin")).expect("create temp bin dir");
        File::create(tmp_base.join("bin").join("sh")).expect("touch bin/sh");

        std::env::set_current_dir(&tmp_base).expect("set cwd");
        let res = find_command_path(osstr("/does/not/matter"), Path::new("bin/sh"))
            .map(|p| p.into_owned());
        std::env::set_current_dir(&cwd_before).ok();

        let found = res.expect("Expected to find relative 'bin/sh' in current dir");
        assert!(found.ends_with("bin/sh"));
        let _ = fs::remove_dir_all(tmp_base);
    }

    #[test]
    fn current_dir_with_dot_prefix() {
        let _lock = lock_process();
        let cwd_before = std::env::current_dir().expect("cwd");
        let tmp_base = make_unique_temp_dir("external_dot");
        File::create(tmp_base.join("foo")).expect("touch foo");

        std::env::set_current_dir(&tmp_base).expect("set cwd");
        let res = find_command_path(osstr("/bin"), Path::new("./foo")).map(|p| p.into_owned());
        std::env::set_current_dir(&cwd_before).ok();

        assert_eq!(res.as_deref(), Some(Path::new("./foo")));
        let _ = fs::remove_dir_all(tmp_base);
    }

    #[test]
    fn empty_path_is_none() {
        let res = find_command_path(osstr("/bin"), Path::new(""));
        assert!(res.is_none(), "Empty path should not resolve to anything");
    }
}
