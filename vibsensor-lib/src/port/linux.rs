use glob::glob;
use std::fs;
use std::path::Path;

/// Whether any process holds `port_name` open, judged from `/proc/*/fd`.
pub fn is_port_open(port_name: &str) -> bool {
    let pattern = match glob("/proc/[0-9]*/fd/*") {
        Ok(paths) => paths,
        Err(_) => return false,
    };

    pattern
        .filter_map(Result::ok)
        .filter_map(|path| fs::read_link(path).ok())
        .any(|link| link == Path::new(port_name))
}
