//! POSIX path helpers for remote paths
//!
//! Remote paths are always `/`-separated, whatever the local platform is.

pub fn is_absolute(path: &str) -> bool {
    path.starts_with('/')
}

/// Join `name` onto `dir` and clean the result
pub fn join(dir: &str, name: &str) -> String {
    if is_absolute(name) {
        return clean(name);
    }
    clean(&format!("{}/{}", dir, name))
}

/// Lexically clean a path: collapse separators, drop `.`, resolve `..`.
pub fn clean(path: &str) -> String {
    let absolute = is_absolute(path);
    let mut parts: Vec<&str> = Vec::new();

    for part in path.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                if parts.last().is_some_and(|p| *p != "..") {
                    parts.pop();
                } else if !absolute {
                    parts.push("..");
                }
            }
            other => parts.push(other),
        }
    }

    let joined = parts.join("/");
    match (absolute, joined.is_empty()) {
        (true, _) => format!("/{}", joined),
        (false, true) => ".".to_string(),
        (false, false) => joined,
    }
}

/// Split into parent directory and final component
pub fn split(path: &str) -> (String, String) {
    let cleaned = clean(path);
    match cleaned.rfind('/') {
        Some(0) => ("/".to_string(), cleaned[1..].to_string()),
        Some(i) => (cleaned[..i].to_string(), cleaned[i + 1..].to_string()),
        None => (".".to_string(), cleaned),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join() {
        assert_eq!(join("/a/b", "c"), "/a/b/c");
        assert_eq!(join("/a/b", "/x/y"), "/x/y");
        assert_eq!(join("/a/b/", "./c/"), "/a/b/c");
        assert_eq!(join("/a/b", "../c"), "/a/c");
    }

    #[test]
    fn test_clean() {
        assert_eq!(clean("/"), "/");
        assert_eq!(clean("/.."), "/");
        assert_eq!(clean("a/../.."), "..");
        assert_eq!(clean(""), ".");
        assert_eq!(clean("//a//b/"), "/a/b");
    }

    #[test]
    fn test_split() {
        assert_eq!(split("/a/b/*.log"), ("/a/b".to_string(), "*.log".to_string()));
        assert_eq!(split("/top"), ("/".to_string(), "top".to_string()));
        assert_eq!(split("name"), (".".to_string(), "name".to_string()));
    }
}
