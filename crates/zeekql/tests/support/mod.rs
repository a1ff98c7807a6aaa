#![allow(dead_code)]

use flate2::write::GzEncoder;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// A Zeek TSV log with the standard eight header lines and a `#close` trailer.
pub fn zeek_log(path: &str, fields: &[(&str, &str)], rows: &[&str]) -> String {
    let names: Vec<&str> = fields.iter().map(|(n, _)| *n).collect();
    let types: Vec<&str> = fields.iter().map(|(_, t)| *t).collect();
    let mut text = format!(
        "#separator \\x09\n\
         #set_separator\t,\n\
         #empty_field\t(empty)\n\
         #unset_field\t-\n\
         #path\t{}\n\
         #open\t2024-01-01-00-00-00\n\
         #fields\t{}\n\
         #types\t{}\n",
        path,
        names.join("\t"),
        types.join("\t")
    );
    for row in rows {
        text.push_str(row);
        text.push('\n');
    }
    text.push_str("#close\t2024-01-01-01-00-00\n");
    text
}

pub fn write_plain(dir: &Path, rel: &str, contents: &str) -> PathBuf {
    let path = dir.join(rel);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("create parent dir");
    }
    fs::write(&path, contents).expect("write log");
    path
}

pub fn write_gzip(dir: &Path, rel: &str, contents: &str) -> PathBuf {
    let mut encoder = GzEncoder::new(Vec::new(), flate2::Compression::default());
    encoder.write_all(contents.as_bytes()).expect("compress log");
    let bytes = encoder.finish().expect("finish gzip");
    let path = dir.join(rel);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("create parent dir");
    }
    fs::write(&path, bytes).expect("write gzip log");
    path
}

pub fn inet_available() -> bool {
    zeekql_db::DbConnection::open_in_memory()
        .and_then(|conn| conn.load_extension("inet"))
        .is_ok()
}
