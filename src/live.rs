//! `live.xml`: the latest conditions, replaced on every 60-second gate.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use crate::error::SinkError;
use crate::models::LiveSnapshot;
use crate::retention::replace_file;

const XML_DECLARATION: &str = "<?xml version='1.0' encoding='utf-8'?>";

// ---

pub fn render(at: DateTime<Utc>, snapshot: &LiveSnapshot) -> String {
    // ---
    let mut xml = String::from(XML_DECLARATION);
    xml.push_str("<meteo>");
    push_element(&mut xml, "timestamp", &at.timestamp().to_string());
    for (name, text) in snapshot.elements() {
        push_element(&mut xml, name, &text);
    }
    xml.push_str("</meteo>");
    xml
}

fn push_element(xml: &mut String, name: &str, text: &str) {
    if text.is_empty() {
        xml.push_str(&format!("<{name} />"));
    } else {
        xml.push_str(&format!("<{name}>{text}</{name}>"));
    }
}

#[derive(Debug, Clone)]
pub struct LiveFile {
    path: PathBuf,
}

impl LiveFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn write(&self, at: DateTime<Utc>, snapshot: &LiveSnapshot) -> Result<(), SinkError> {
        replace_file(&self.path, render(at, snapshot).as_bytes())
    }
}
