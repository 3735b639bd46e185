/* A discoverable config profile: one JSON file under the profile directory
 * the orchestrator watches for switch requests (4.G). */

use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Profile {
    pub path: PathBuf,
    pub display_name: String,
    pub is_main: bool,
}

impl Profile {
    pub fn from_path(path: &Path, main_path: &Path) -> Profile {
        let display_name = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| path.to_string_lossy().to_string());
        Profile {
            path: path.to_path_buf(),
            display_name,
            is_main: path == main_path,
        }
    }

    /* Scan `dir` for `*.json` files, the main config always sorted first,
     * the rest alphabetically (3). */
    pub fn discover(dir: &Path, main_path: &Path) -> std::io::Result<Vec<Profile>> {
        let mut others = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            if path == main_path {
                continue;
            }
            others.push(path);
        }
        others.sort();

        let mut out = vec![Profile::from_path(main_path, main_path)];
        out.extend(others.into_iter().map(|p| Profile::from_path(&p, main_path)));
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn main_profile_is_flagged() {
        let main = PathBuf::from("/cfg/main.json");
        let p = Profile::from_path(&main, &main);
        assert!(p.is_main);
        assert_eq!(p.display_name, "main");
    }

    #[test]
    fn non_main_profile_is_not_flagged() {
        let main = PathBuf::from("/cfg/main.json");
        let other = PathBuf::from("/cfg/racing.json");
        let p = Profile::from_path(&other, &main);
        assert!(!p.is_main);
        assert_eq!(p.display_name, "racing");
    }

    #[test]
    fn discover_lists_main_first_then_alphabetical() {
        let dir = tempfile::tempdir().unwrap();
        let main_path = dir.path().join("main.json");
        std::fs::write(&main_path, "{}").unwrap();
        std::fs::write(dir.path().join("zzz.json"), "{}").unwrap();
        std::fs::write(dir.path().join("aaa.json"), "{}").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let profiles = Profile::discover(dir.path(), &main_path).unwrap();
        let names: Vec<_> = profiles.iter().map(|p| p.display_name.clone()).collect();
        assert_eq!(names, vec!["main", "aaa", "zzz"]);
        assert!(profiles[0].is_main);
    }
}
