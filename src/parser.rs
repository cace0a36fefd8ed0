use crate::error::Result;
use crate::models::*;
use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// Reads meter export files and normalizes the loosely-typed fields in them.
pub struct ExportParser {}

impl Default for ExportParser {
    fn default() -> Self {
        Self::new()
    }
}

impl ExportParser {
    pub fn new() -> Self {
        Self {}
    }

    pub fn parse_export_file(&self, file_path: &Path) -> Result<ExportFile> {
        let file = File::open(file_path)?;
        let reader = BufReader::new(file);
        let export: ExportFile = serde_json::from_reader(reader)?;

        tracing::debug!(
            file = %file_path.display(),
            rooms = export.rooms.len(),
            counters = export.counters.len(),
            "Parsed export file"
        );

        Ok(export)
    }

    pub fn parse_export_str(&self, content: &str) -> Result<ExportFile> {
        Ok(serde_json::from_str(content)?)
    }

    /// Numeric value of a raw reading.
    ///
    /// Numbers pass through. Strings keep only digits, `,`, `.` and `-`, with
    /// `,` read as decimal separator; anything that still fails to parse
    /// yields `None` rather than a guessed number.
    pub fn parse_value(&self, raw: &serde_json::Value) -> Option<f64> {
        match raw {
            serde_json::Value::Number(n) => n.as_f64(),
            serde_json::Value::String(s) => {
                let cleaned: String = s
                    .chars()
                    .filter(|c| c.is_ascii_digit() || matches!(c, ',' | '.' | '-'))
                    .map(|c| if c == ',' { '.' } else { c })
                    .collect();
                if cleaned.is_empty() {
                    return None;
                }
                cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
            }
            _ => None,
        }
    }

    /// Raw value as text, for the `Value_Orig` column and error messages.
    pub fn raw_value_text(&self, raw: &serde_json::Value) -> Option<String> {
        match raw {
            serde_json::Value::Null => None,
            serde_json::Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    pub fn room_names(&self, export: &ExportFile) -> HashMap<String, String> {
        export
            .rooms
            .iter()
            .filter_map(|room| {
                let id = room.room_id.clone()?;
                let name = room.display_name()?.to_string();
                Some((id, name))
            })
            .collect()
    }

    /// Returns (room_name, object_name) for a counter.
    pub fn resolve_room_and_object(
        &self,
        counter: &CounterEntry,
        rooms: &HashMap<String, String>,
    ) -> (Option<String>, Option<String>) {
        let room_name = counter
            .room_id
            .as_ref()
            .and_then(|id| rooms.get(id))
            .cloned();
        let counter_name = counter.counter_name.as_deref().unwrap_or("").trim();

        let object_name = match &room_name {
            Some(room) => Some(object_prefix(room).to_string()),
            None if !counter_name.is_empty() => Some(object_prefix(counter_name).to_string()),
            None => None,
        };

        (room_name, object_name)
    }
}

/// Building/object part of a room or counter name: the text before the
/// first `.`, or before the first `-` when there is no dot.
pub fn object_prefix(name: &str) -> &str {
    for delim in ['.', '-'] {
        if let Some((prefix, _)) = name.split_once(delim) {
            return prefix;
        }
    }
    name
}
