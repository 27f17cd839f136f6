/// One server-sent event record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SseRecord {
    pub event: Option<String>,
    pub data: String,
}

impl SseRecord {
    /// Records without an explicit event name fire as `message`, matching
    /// EventSource semantics.
    pub fn is_message(&self) -> bool {
        match &self.event {
            None => true,
            Some(name) => name == "message",
        }
    }
}

/// Parse raw SSE text into records. Records end at a blank line; a trailing
/// record that never got its blank line is returned as well. Comment lines
/// (leading `:`) and fields we do not track (`id`, `retry`) are skipped.
/// Multiple `data` lines of one record join with a newline.
pub fn parse_records(raw: &str) -> Vec<SseRecord> {
    let mut records = Vec::new();
    let mut event: Option<String> = None;
    let mut data_lines: Vec<&str> = Vec::new();

    for line in raw.lines() {
        let line = line.strip_suffix('\r').unwrap_or(line);
        if line.is_empty() {
            if event.is_some() || !data_lines.is_empty() {
                records.push(SseRecord {
                    event: event.take(),
                    data: data_lines.join("\n"),
                });
                data_lines.clear();
            }
            continue;
        }
        if line.starts_with(':') {
            continue;
        }
        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match field {
            "event" => event = Some(value.to_owned()),
            "data" => data_lines.push(value),
            _ => {}
        }
    }

    if event.is_some() || !data_lines.is_empty() {
        records.push(SseRecord {
            event,
            data: data_lines.join("\n"),
        });
    }
    records
}
