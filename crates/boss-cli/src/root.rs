use boss_core::config::CONFIG_FILE;
use std::path::{Path, PathBuf};

/// Resolve the project root directory.
///
/// Priority:
/// 1. `--root` flag / `ECS_BOSS_ROOT` env var (passed in as `explicit`)
/// 2. Walk upward from `cwd` looking for `ecs-boss.yaml`
/// 3. Walk upward from `cwd` looking for a `Dockerfile`
/// 4. Walk upward from `cwd` looking for `.git/`
/// 5. Fall back to `cwd`
pub fn resolve_root(explicit: Option<&Path>) -> PathBuf {
    if let Some(p) = explicit {
        return p.to_path_buf();
    }
    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    find_root(&cwd).unwrap_or(cwd)
}

fn find_root(start: &Path) -> Option<PathBuf> {
    let markers: [(&str, fn(&Path) -> bool); 3] = [
        (CONFIG_FILE, Path::is_file),
        ("Dockerfile", Path::is_file),
        (".git", Path::is_dir),
    ];
    markers.iter().find_map(|(name, check)| {
        start
            .ancestors()
            .find(|dir| check(&dir.join(name)))
            .map(Path::to_path_buf)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn explicit_root_wins() {
        let dir = TempDir::new().unwrap();
        let result = resolve_root(Some(dir.path()));
        assert_eq!(result, dir.path());
    }

    #[test]
    fn config_file_beats_git_dir() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join(".git")).unwrap();
        let app = dir.path().join("app");
        std::fs::create_dir_all(app.join("src/deep")).unwrap();
        std::fs::write(app.join(CONFIG_FILE), "cluster: main\n").unwrap();

        assert_eq!(find_root(&app.join("src/deep")), Some(app));
    }

    #[test]
    fn dockerfile_marks_root() {
        let dir = TempDir::new().unwrap();
        let sub = dir.path().join("web/assets");
        std::fs::create_dir_all(&sub).unwrap();
        std::fs::write(dir.path().join("web/Dockerfile"), "FROM scratch\n").unwrap();

        assert_eq!(find_root(&sub), Some(dir.path().join("web")));
    }

    #[test]
    fn falls_back_to_git_dir() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join(".git")).unwrap();
        let sub = dir.path().join("a/b");
        std::fs::create_dir_all(&sub).unwrap();

        assert_eq!(find_root(&sub), Some(dir.path().to_path_buf()));
    }
}
