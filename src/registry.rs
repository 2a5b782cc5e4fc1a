//! # Variable Registries
//!
//! Name lookup behind the debug menu. Two scopes exist: the handler-local
//! one, describing the debug handler's own live values, and a process-wide
//! global one built from configuration. Both are fixed tables; a name that
//! is not in the table renders as `None`.

use std::collections::BTreeMap;

use crate::config::Config;

/// Rendering of a name that is not defined
pub const NOT_FOUND: &str = "None";

/// A table of names the debug menu can resolve
pub trait Scope {
    /// Text form of `name`, if the scope defines it
    fn lookup(&self, name: &str) -> Option<String>;

    /// Text form of `name`, or [`NOT_FOUND`]
    fn render(&self, name: &str) -> String {
        self.lookup(name).unwrap_or_else(|| NOT_FOUND.to_string())
    }
}

/// Process-wide names, shared read-only by every connection
#[derive(Debug, Clone)]
pub struct GlobalScope {
    entries: BTreeMap<&'static str, String>,
}

impl GlobalScope {
    /// Build the table from the running configuration
    pub fn from_config(config: &Config) -> Self {
        let mut entries = BTreeMap::new();
        entries.insert("HOST", config.server.host.clone());
        entries.insert("PORT", config.server.port.to_string());
        entries.insert("FLAG", config.challenge.flag.clone());
        entries.insert("__name__", "__main__".to_string());
        for handler in ["process_connection", "main_menu", "debug_menu"] {
            entries.insert(handler, format!("<function {}>", handler));
        }
        entries.insert("LineReader", "<class 'LineReader'>".to_string());
        Self { entries }
    }

    /// Names defined in this scope
    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.entries.keys().copied()
    }
}

impl Scope for GlobalScope {
    fn lookup(&self, name: &str) -> Option<String> {
        self.entries.get(name).cloned()
    }
}

/// Live values of the debug handler at the moment of a lookup
#[derive(Debug)]
pub struct LocalScope<'a> {
    /// Description of the connection stream
    pub stream: &'a str,
    /// Description of the line reader
    pub reader: String,
    /// Menu option that triggered the lookup
    pub result: &'a str,
    /// Raw name the client sent
    pub name: &'a [u8],
}

impl Scope for LocalScope<'_> {
    fn lookup(&self, name: &str) -> Option<String> {
        match name {
            "stream" => Some(self.stream.to_string()),
            "reader" => Some(self.reader.clone()),
            "result" => Some(self.result.to_string()),
            "name" => Some(bytes_literal(self.name)),
            _ => None,
        }
    }
}

/// Python-style `b'...'` rendering of raw bytes
pub fn bytes_literal(data: &[u8]) -> String {
    let quote = if data.contains(&b'\'') && !data.contains(&b'"') {
        b'"'
    } else {
        b'\''
    };

    let mut out = String::with_capacity(data.len() + 3);
    out.push('b');
    out.push(quote as char);
    for &byte in data {
        match byte {
            b'\\' => out.push_str("\\\\"),
            b'\t' => out.push_str("\\t"),
            b'\n' => out.push_str("\\n"),
            b'\r' => out.push_str("\\r"),
            b if b == quote => {
                out.push('\\');
                out.push(b as char);
            }
            0x20..=0x7e => out.push(byte as char),
            _ => out.push_str(&format!("\\x{:02x}", byte)),
        }
    }
    out.push(quote as char);
    out
}
