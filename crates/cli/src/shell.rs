//! Command parsing and dispatch for the operator shell.

use std::io::{self, Write};

use anyhow::{anyhow, bail, Context, Result};
use bytes::Bytes;
use cache::{Cache, CacheError};
use codec::RecordType;
use store::FileStore;
use tracing::debug;

/// What a command printed, before formatting.
#[derive(Debug)]
enum Reply {
    Ok,
    Nil,
    Value(Bytes),
    Text(String),
    Exit,
}

pub struct Shell {
    cache: Cache<FileStore>,
}

impl Shell {
    pub fn new(cache: Cache<FileStore>) -> Self {
        Self { cache }
    }

    #[cfg(test)]
    pub fn cache(&self) -> &Cache<FileStore> {
        &self.cache
    }

    /// Runs one input line and writes its output. Returns `false` once the
    /// shell should stop.
    pub fn execute<W: Write>(&mut self, line: &str, out: &mut W) -> io::Result<bool> {
        let parts: Vec<&str> = line.split_whitespace().collect();
        let Some((cmd, args)) = parts.split_first() else {
            return Ok(true);
        };
        match self.run(&cmd.to_uppercase(), args) {
            Ok(Reply::Ok) => writeln!(out, "OK")?,
            Ok(Reply::Nil) => writeln!(out, "(nil)")?,
            Ok(Reply::Value(v)) => writeln!(out, "{}", String::from_utf8_lossy(&v))?,
            Ok(Reply::Text(t)) => writeln!(out, "{}", t)?,
            Ok(Reply::Exit) => return Ok(false),
            Err(e) => {
                debug!(command = %cmd, error = %format!("{:#}", e), "command failed");
                writeln!(out, "ERR {:#}", e)?
            }
        }
        Ok(true)
    }

    /// Flushes everything still dirty.
    pub fn finish(mut self) -> Result<(), CacheError> {
        self.cache.sync()
    }

    fn run(&mut self, cmd: &str, args: &[&str]) -> Result<Reply> {
        match cmd {
            "GET" => {
                let [obj, attr] = args else {
                    bail!("usage: GET obj attr");
                };
                let value = self.cache.get_attr(object(obj)?, attribute(attr)?)?;
                Ok(value.map_or(Reply::Nil, Reply::Value))
            }
            "SET" => {
                let [obj, attr, value @ ..] = args else {
                    bail!("usage: SET obj attr value");
                };
                if value.is_empty() {
                    bail!("usage: SET obj attr value");
                }
                let value = Bytes::from(value.join(" "));
                self.cache
                    .put_attr(object(obj)?, attribute(attr)?, value)
                    .context("set failed")?;
                Ok(Reply::Ok)
            }
            "DEL" => {
                let [obj, attr] = args else {
                    bail!("usage: DEL obj attr");
                };
                self.cache
                    .del_attr(object(obj)?, attribute(attr)?)
                    .context("del failed")?;
                Ok(Reply::Ok)
            }
            "KGET" => {
                let [rt, key] = args else {
                    bail!("usage: KGET type key");
                };
                let value = self.cache.get(key.as_bytes(), record_type(rt)?)?;
                Ok(value.map_or(Reply::Nil, Reply::Value))
            }
            "KPUT" => {
                let [rt, key, value @ ..] = args else {
                    bail!("usage: KPUT type key value");
                };
                if value.is_empty() {
                    bail!("usage: KPUT type key value");
                }
                let value = Bytes::from(value.join(" "));
                self.cache
                    .put(key.as_bytes(), record_type(rt)?, Some(value))
                    .context("put failed")?;
                Ok(Reply::Ok)
            }
            "KDEL" => {
                let [rt, key] = args else {
                    bail!("usage: KDEL type key");
                };
                self.cache
                    .delete(key.as_bytes(), record_type(rt)?)
                    .context("del failed")?;
                Ok(Reply::Ok)
            }
            "SYNC" => {
                self.cache.sync().context("sync failed")?;
                Ok(Reply::Ok)
            }
            "RESET" => {
                self.cache.reset().context("reset failed")?;
                Ok(Reply::Ok)
            }
            "STATS" => Ok(Reply::Text(self.cache.stats().to_string())),
            "OBJS" => Ok(Reply::Text(self.cache.cached_objects().to_string())),
            "ATTRS" => {
                let lines = self.cache.cached_attributes();
                let mut text = String::from("Dbref      Attribute     Size\n");
                text.push_str("=============================");
                for line in &lines {
                    text.push('\n');
                    text.push_str(&line.to_string());
                }
                text.push_str(&format!("\n({} attributes)", lines.len()));
                Ok(Reply::Text(text))
            }
            "DUMP" => {
                let on = match args {
                    [flag] if flag.eq_ignore_ascii_case("on") => true,
                    [flag] if flag.eq_ignore_ascii_case("off") => false,
                    _ => bail!("usage: DUMP ON|OFF"),
                };
                self.cache.set_dumping(on);
                Ok(Reply::Ok)
            }
            "OPTIMIZE" => {
                self.cache.sync().context("sync failed")?;
                self.cache
                    .store_mut()
                    .optimize()
                    .context("optimize failed")?;
                let store = self.cache.store();
                Ok(Reply::Text(format!(
                    "OK ({} records, {} bytes)",
                    store.len(),
                    store.file_size()
                )))
            }
            "EXIT" | "QUIT" => Ok(Reply::Exit),
            other => bail!("unknown command: {}", other),
        }
    }
}

fn object(s: &str) -> Result<u32> {
    let s = s.strip_prefix('#').unwrap_or(s);
    s.parse().map_err(|_| anyhow!("bad object number '{}'", s))
}

fn attribute(s: &str) -> Result<i32> {
    s.parse().map_err(|_| anyhow!("bad attribute number '{}'", s))
}

/// Accepts a record type by name or by number.
pub(crate) fn record_type(s: &str) -> Result<RecordType> {
    let rt = match s.to_ascii_lowercase().as_str() {
        "attribute" | "attr" => RecordType::ATTRIBUTE,
        "dbinfo" => RecordType::DBINFO,
        "object" | "obj" => RecordType::OBJECT,
        "atrnum" => RecordType::ATRNUM,
        "moduletype" | "module" => RecordType::MODULETYPE,
        n => RecordType(
            n.parse()
                .map_err(|_| anyhow!("bad record type '{}'", s))?,
        ),
    };
    Ok(rt)
}
