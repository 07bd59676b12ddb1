use crate::state::{DeviceState, StatusSnapshot};

const STATUS_TEMPLATE: &str = include_str!("ui/status.html");

const BYTES_PER_MB: u64 = 1024 * 1024;

// ---------------------------------------------------------------------------
// Response
// ---------------------------------------------------------------------------

/// Full HTTP/1.1 response for every completed request. The connection is
/// closed after it is written, whatever the request asked for.
pub fn status_response(device: &DeviceState) -> String {
    let body = render_status(&device.to_status());
    format!(
        "HTTP/1.1 200 OK\r\n\
         Content-Type: text/html; charset=utf-8\r\n\
         Content-Length: {}\r\n\
         Connection: close\r\n\
         \r\n\
         {body}",
        body.len()
    )
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

/// Fill `{{slot}}` markers in one pass over the template, so substituted
/// text is never scanned for further slots. Unknown slots are left as is.
pub fn render_status(snap: &StatusSnapshot) -> String {
    let mut page = String::with_capacity(STATUS_TEMPLATE.len() + 256);
    let mut rest = STATUS_TEMPLATE;

    while let Some(open) = rest.find("{{") {
        page.push_str(&rest[..open]);
        let after = &rest[open + 2..];
        let Some(close) = after.find("}}") else {
            rest = &rest[open..];
            break;
        };
        match slot_value(snap, &after[..close]) {
            Some(value) => page.push_str(&value),
            None => page.push_str(&rest[open..open + close + 4]),
        }
        rest = &after[close + 2..];
    }
    page.push_str(rest);
    page
}

fn slot_value(snap: &StatusSnapshot, slot: &str) -> Option<String> {
    let value = match slot {
        "clock" => snap.clock.clone(),
        "source" => snap.clock_source.to_string(),
        "mode" => snap.mode.to_string(),
        "ssid" => escape_html(&snap.ssid),
        "address" => snap.address.clone(),
        "total" => megabytes(snap.usage.total_bytes),
        "used" => megabytes(snap.usage.used_bytes),
        "free" => megabytes(snap.usage.free_bytes),
        "build" => snap.build.to_string(),
        _ => return None,
    };
    Some(value)
}

fn megabytes(bytes: u64) -> String {
    format!("{} MB", bytes / BYTES_PER_MB)
}

fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ClockSource;
    use crate::net::NetworkMode;
    use crate::storage::StorageUsage;

    fn snapshot() -> StatusSnapshot {
        StatusSnapshot {
            clock: "2024/01/12,20:11:01".into(),
            clock_source: ClockSource::Network,
            usage: StorageUsage::from_space(8 * 1024 * BYTES_PER_MB, 3 * 1024 * BYTES_PER_MB),
            mode: NetworkMode::AccessPoint,
            ssid: "farm<1>".into(),
            address: "192.168.4.1".into(),
            build: "telemetry-gateway 0.1.0",
        }
    }

    #[test]
    fn render_fills_every_slot() {
        let page = render_status(&snapshot());
        assert!(!page.contains("{{"));
        assert!(page.contains("2024/01/12,20:11:01 (network)"));
        assert!(page.contains("access point farm&lt;1&gt; at 192.168.4.1"));
        assert!(page.contains("<td>8192 MB</td>"));
        assert!(page.contains("<td>5120 MB</td>"));
        assert!(page.contains("<td>3072 MB</td>"));
        assert!(page.contains("telemetry-gateway 0.1.0"));
    }

    #[test]
    fn substituted_text_is_not_expanded_again() {
        let snap = StatusSnapshot {
            ssid: "{{build}} {{total}}".into(),
            ..snapshot()
        };
        let page = render_status(&snap);
        assert!(page.contains("access point {{build}} {{total}} at 192.168.4.1"));
        assert_eq!(page.matches("telemetry-gateway 0.1.0").count(), 1);
    }

    #[test]
    fn megabytes_truncates() {
        assert_eq!(megabytes(0), "0 MB");
        assert_eq!(megabytes(BYTES_PER_MB - 1), "0 MB");
        assert_eq!(megabytes(3 * BYTES_PER_MB + 17), "3 MB");
    }

    #[test]
    fn response_headers_and_length() {
        let dir = tempfile::tempdir().unwrap();
        let device = crate::state::test_device(dir.path());

        let response = status_response(&device);

        assert!(response.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(response.contains("Connection: close\r\n"));
        let (head, body) = response.split_once("\r\n\r\n").unwrap();
        let declared: usize = head
            .lines()
            .find_map(|l| l.strip_prefix("Content-Length: "))
            .unwrap()
            .parse()
            .unwrap();
        assert_eq!(declared, body.len());
        assert!(body.contains("station test at 127.0.0.1"));
    }
}
