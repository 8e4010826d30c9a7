use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use mailprobe::{BatchItem, ProxyDescriptor};

fn meaningful_lines(raw: &str) -> impl Iterator<Item = (usize, &str)> {
    raw.lines()
        .enumerate()
        .map(|(idx, line)| (idx + 1, line.trim()))
        .filter(|(_, line)| !line.is_empty() && !line.starts_with('#'))
}

fn is_json(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"))
}

/// `.json` files hold an array of strings or `{email, password?, proxy?}`
/// objects; anything else is read as `email[:password]` lines.
pub fn read_items(path: &Path) -> Result<Vec<BatchItem>> {
    let raw = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    if is_json(path) {
        return serde_json::from_str(&raw).with_context(|| format!("parse {}", path.display()));
    }
    Ok(meaningful_lines(&raw)
        .map(|(_, line)| BatchItem::parse_line(line))
        .collect())
}

/// Same split as [`read_items`]: a `.json` array of strings or
/// `{host, port, ...}` objects, otherwise one proxy per line.
pub fn read_proxies(path: &Path) -> Result<Vec<ProxyDescriptor>> {
    let raw = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    if is_json(path) {
        return serde_json::from_str(&raw).with_context(|| format!("parse {}", path.display()));
    }
    meaningful_lines(&raw)
        .map(|(line_no, line)| {
            line.parse::<ProxyDescriptor>()
                .with_context(|| format!("{}:{line_no}", path.display()))
        })
        .collect()
}

/// Round-robin over `proxies` for the items that do not name their own.
pub fn assign_proxies(items: &mut [BatchItem], proxies: &[ProxyDescriptor]) {
    if proxies.is_empty() {
        return;
    }
    let mut next = proxies.iter().cycle();
    for item in items.iter_mut().filter(|item| item.proxy.is_none()) {
        item.proxy = next.next().cloned();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_files_skip_blanks_and_comments() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("list.txt");
        fs::write(&path, "# clients\na@example.com:secret\n\n  b@example.com  \n").unwrap();
        let items = read_items(&path).unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].password.as_deref(), Some("secret"));
        assert_eq!(items[1].email.as_deref(), Some("b@example.com"));
    }

    #[test]
    fn json_files_are_arrays() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("list.JSON");
        fs::write(&path, r#"["a@example.com", {"email": "b@example.com"}]"#).unwrap();
        assert_eq!(read_items(&path).unwrap().len(), 2);
    }

    #[test]
    fn proxies_load_from_json_objects() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("proxies.json");
        fs::write(&path, r#"["socks5://10.0.0.1:1080", {"host": "10.0.0.2", "port": 3128}]"#).unwrap();
        let proxies = read_proxies(&path).unwrap();
        assert_eq!(proxies[1].port(), 3128);
    }

    #[test]
    fn bad_proxy_line_names_its_position() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("proxies.txt");
        fs::write(&path, "socks5://10.0.0.1:1080\nftp://nope\n").unwrap();
        let err = read_proxies(&path).unwrap_err();
        assert!(format!("{err:#}").contains("proxies.txt:2"), "{err:#}");
    }

    #[test]
    fn proxies_rotate_over_items_without_one() {
        let first: ProxyDescriptor = "socks5://10.0.0.1:1080".parse().unwrap();
        let second: ProxyDescriptor = "http://10.0.0.2:3128".parse().unwrap();
        let own: ProxyDescriptor = "socks5://10.0.0.9:1080".parse().unwrap();
        let mut items = vec![
            BatchItem::new("a@example.com"),
            BatchItem::new("b@example.com").with_proxy(Some(own.clone())),
            BatchItem::new("c@example.com"),
            BatchItem::new("d@example.com"),
        ];
        assign_proxies(&mut items, &[first.clone(), second.clone()]);
        let assigned: Vec<_> = items.iter().map(|item| item.proxy.clone()).collect();
        assert_eq!(assigned, [Some(first.clone()), Some(own), Some(second), Some(first)]);
    }
}
