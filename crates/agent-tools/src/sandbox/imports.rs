//! Static import scan deciding whether a container run needs `pip install`.

use once_cell::sync::Lazy;
use regex::Regex;

static IMPORT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^\s*(?:from\s+([A-Za-z_][\w.]*)\s+import\b|import\s+([A-Za-z_][\w.]*(?:\s*,\s*[A-Za-z_][\w.]*)*))")
        .expect("import regex is valid")
});

/// Top-level modules that ship with CPython and never need installing.
const STDLIB: &[&str] = &[
    "__future__", "abc", "argparse", "array", "ast", "asyncio", "base64", "binascii", "bisect",
    "builtins", "calendar", "cmath", "collections", "colorsys", "concurrent", "configparser",
    "contextlib", "copy", "csv", "ctypes", "dataclasses", "datetime", "decimal", "difflib", "dis",
    "email", "enum", "errno", "fractions", "functools", "gc", "getpass", "glob", "gzip",
    "hashlib", "heapq", "hmac", "html", "http", "importlib", "inspect", "io", "ipaddress",
    "itertools", "json", "keyword", "locale", "logging", "lzma", "math", "mimetypes",
    "multiprocessing", "numbers", "operator", "os", "pathlib", "pickle", "platform", "pprint",
    "queue", "random", "re", "sched", "secrets", "select", "shlex", "shutil", "signal", "socket",
    "sqlite3", "ssl", "stat", "statistics", "string", "struct", "subprocess", "sys", "tarfile",
    "tempfile", "textwrap", "threading", "time", "timeit", "tkinter", "token", "tokenize",
    "traceback", "types", "typing", "unicodedata", "unittest", "urllib", "uuid", "warnings",
    "weakref", "xml", "zipfile", "zlib", "zoneinfo",
];

/// Import names whose PyPI distribution is named differently.
const DISTRIBUTION_ALIASES: &[(&str, &str)] = &[
    ("PIL", "pillow"),
    ("bs4", "beautifulsoup4"),
    ("cv2", "opencv-python-headless"),
    ("dateutil", "python-dateutil"),
    ("dotenv", "python-dotenv"),
    ("sklearn", "scikit-learn"),
    ("yaml", "pyyaml"),
];

/// Distributions to install for the third-party imports found in `source`,
/// deduplicated in first-seen order. Names in `local` are modules that sit
/// next to the code being run and are never installed.
pub fn third_party_packages(source: &str, local: &[&str]) -> Vec<String> {
    let mut packages: Vec<String> = Vec::new();

    for captures in IMPORT_RE.captures_iter(source) {
        let names = captures
            .get(1)
            .or_else(|| captures.get(2))
            .map(|m| m.as_str())
            .unwrap_or_default();

        for name in names.split(',') {
            let root = name.trim().split('.').next().unwrap_or_default();
            if root.is_empty() || STDLIB.contains(&root) || local.contains(&root) {
                continue;
            }

            let package = DISTRIBUTION_ALIASES
                .iter()
                .find(|(module, _)| *module == root)
                .map(|(_, dist)| (*dist).to_string())
                .unwrap_or_else(|| root.to_string());

            if !packages.contains(&package) {
                packages.push(package);
            }
        }
    }

    packages
}
