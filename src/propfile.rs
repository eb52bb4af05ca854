//! propfile — line reading and `name=value` property-file parsing.
//!
//! Правила разбора:
//! - строки обрезаются: ведущие пробелы, хвостовые '\n', '\r', ' ';
//! - строки, начинающиеся с '#', пропускаются;
//! - строки без '=' или с '=' в позиции 0 пропускаются;
//! - иначе name = до первого '=', value = всё после него.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::error::{PropError, Result};

/// Feed each line to `f` until it returns false.
pub fn file_readline<R, F>(trim: bool, mut reader: R, mut f: F) -> std::io::Result<()>
where
    R: BufRead,
    F: FnMut(&str) -> bool,
{
    let mut buf: Vec<u8> = Vec::with_capacity(1024);
    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf)? == 0 {
            break;
        }
        let line = String::from_utf8_lossy(&buf);
        let mut s: &str = &line;
        if trim {
            s = s.trim_end_matches(['\n', '\r', ' ']);
            s = s.trim_start_matches(' ');
        }
        if !f(s) {
            break;
        }
    }
    Ok(())
}

/// Parse property lines from `reader`; `f` returning false stops parsing.
pub fn parse_prop_file<R, F>(reader: R, mut f: F) -> std::io::Result<()>
where
    R: BufRead,
    F: FnMut(&str, &str) -> bool,
{
    file_readline(true, reader, |line| {
        if line.starts_with('#') {
            return true;
        }
        match line.find('=') {
            None | Some(0) => true,
            Some(eq) => f(&line[..eq], &line[eq + 1..]),
        }
    })
}

/// Open `path` and parse it.
pub fn parse_prop_path<P, F>(path: P, f: F) -> Result<()>
where
    P: AsRef<Path>,
    F: FnMut(&str, &str) -> bool,
{
    let path = path.as_ref();
    let file = File::open(path).map_err(|source| PropError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    parse_prop_file(BufReader::new(file), f)?;
    Ok(())
}
