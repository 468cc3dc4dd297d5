//! Configuration portal form handling
//!
//! Hardware-independent half of the portal: rendering the HTML form and
//! decoding what the browser sends back. The firmware's HTTP task only
//! shuffles bytes between a socket and these functions.

use core::fmt::{self, Write};
use heapless::{String, Vec};
use thiserror_no_std::Error;

use crate::config::{FieldId, floor_char_boundary};
use crate::network::{PASSWORD_CAPACITY, PORTAL_VALUE_CAPACITY, PortalField, SSID_CAPACITY};

/// Path the form submits to
pub const SAVE_PATH: &str = "/save";

const SSID_FIELD: &str = "ssid";
const PASSWORD_FIELD: &str = "password";

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortalError {
    #[error("malformed request line")]
    BadRequestLine,
    #[error("malformed percent escape")]
    BadEscape,
    #[error("value is not valid UTF-8")]
    InvalidUtf8,
    #[error("network name is required")]
    MissingSsid,
}

/// What the portal should do with a request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortalRoute<'a> {
    /// Serve the configuration form.
    Form,
    /// Store the submitted query string.
    Save(&'a str),
    /// Any other page load, sent back to the form so connectivity checks
    /// open the portal.
    Redirect,
    NotFound,
}

/// Values a user submitted through the portal.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PortalSubmission {
    pub ssid: String<SSID_CAPACITY>,
    pub password: String<PASSWORD_CAPACITY>,
    fields: [Option<String<PORTAL_VALUE_CAPACITY>>; 2],
}

impl PortalSubmission {
    /// Submitted value for a registered field, if the form carried it.
    pub fn field(&self, id: FieldId) -> Option<&str> {
        self.fields[id.index()].as_deref()
    }

    pub fn set_field(&mut self, id: FieldId, value: String<PORTAL_VALUE_CAPACITY>) {
        self.fields[id.index()] = Some(value);
    }
}

/// Split an HTTP request line into method and routed target.
pub fn route_request(request: &str) -> Result<PortalRoute<'_>, PortalError> {
    let line = request.lines().next().ok_or(PortalError::BadRequestLine)?;
    let mut parts = line.split_ascii_whitespace();
    let method = parts.next().ok_or(PortalError::BadRequestLine)?;
    let target = parts.next().ok_or(PortalError::BadRequestLine)?;

    let (path, query) = match target.split_once('?') {
        Some((path, query)) => (path, query),
        None => (target, ""),
    };

    Ok(match (method, path) {
        ("GET", "/") | ("GET", "/index.html") => PortalRoute::Form,
        ("GET", SAVE_PATH) => PortalRoute::Save(query),
        ("GET", _) => PortalRoute::Redirect,
        _ => PortalRoute::NotFound,
    })
}

/// Decode an `application/x-www-form-urlencoded` submission.
///
/// Values longer than their buffers are truncated; unknown keys are ignored.
pub fn parse_submission(query: &str) -> Result<PortalSubmission, PortalError> {
    let mut submission = PortalSubmission::default();

    for pair in query.split('&').filter(|pair| !pair.is_empty()) {
        let (raw_key, raw_value) = pair.split_once('=').unwrap_or((pair, ""));
        let key: String<16> = decode_component(raw_key)?;

        match key.as_str() {
            SSID_FIELD => submission.ssid = decode_component(raw_value)?,
            PASSWORD_FIELD => submission.password = decode_component(raw_value)?,
            other => {
                if let Some(id) = FieldId::from_key(other) {
                    submission.set_field(id, decode_component(raw_value)?);
                }
            }
        }
    }

    if submission.ssid.trim().is_empty() {
        return Err(PortalError::MissingSsid);
    }
    Ok(submission)
}

/// Percent-decode one component into a bounded string.
fn decode_component<const N: usize>(raw: &str) -> Result<String<N>, PortalError> {
    let mut bytes: Vec<u8, N> = Vec::new();
    let mut input = raw.bytes();

    while let Some(byte) = input.next() {
        let decoded = match byte {
            b'+' => b' ',
            b'%' => {
                let high = input.next().and_then(hex_value).ok_or(PortalError::BadEscape)?;
                let low = input.next().and_then(hex_value).ok_or(PortalError::BadEscape)?;
                (high << 4) | low
            }
            other => other,
        };
        if bytes.push(decoded).is_err() {
            break;
        }
    }

    let valid = match core::str::from_utf8(&bytes) {
        Ok(text) => text.len(),
        // Truncation split a multi-byte character; drop the partial tail.
        Err(e) if e.error_len().is_none() => e.valid_up_to(),
        Err(_) => return Err(PortalError::InvalidUtf8),
    };
    let text = core::str::from_utf8(&bytes[..valid]).map_err(|_| PortalError::InvalidUtf8)?;

    let mut out = String::new();
    out.push_str(text).map_err(|_| PortalError::InvalidUtf8)?;
    Ok(out)
}

fn hex_value(byte: u8) -> Option<u8> {
    match byte {
        b'0'..=b'9' => Some(byte - b'0'),
        b'a'..=b'f' => Some(byte - b'a' + 10),
        b'A'..=b'F' => Some(byte - b'A' + 10),
        _ => None,
    }
}

/// Render the configuration form.
pub fn render_form<W: Write>(out: &mut W, portal_ssid: &str, fields: &[PortalField]) -> fmt::Result {
    out.write_str(
        "<!DOCTYPE html><html><head><meta charset=\"utf-8\">\
         <meta name=\"viewport\" content=\"width=device-width,initial-scale=1\">\
         <title>",
    )?;
    write_escaped(out, portal_ssid)?;
    out.write_str("</title></head><body><h1>")?;
    write_escaped(out, portal_ssid)?;
    write!(out, "</h1><form method=\"get\" action=\"{}\">", SAVE_PATH)?;

    write_input(out, SSID_FIELD, "WiFi network", "text", "", SSID_CAPACITY)?;
    write_input(out, PASSWORD_FIELD, "WiFi password", "password", "", PASSWORD_CAPACITY)?;
    for field in fields {
        write_input(
            out,
            field.id.key(),
            field.label,
            "text",
            &field.value,
            field.capacity,
        )?;
    }

    out.write_str("<button type=\"submit\">Save</button></form></body></html>")
}

/// Page shown after a successful submission.
pub fn render_saved<W: Write>(out: &mut W, ssid: &str) -> fmt::Result {
    out.write_str("<!DOCTYPE html><html><body><p>Saved. Connecting to ")?;
    write_escaped(out, ssid)?;
    out.write_str("&hellip;</p></body></html>")
}

fn write_input<W: Write>(
    out: &mut W,
    name: &str,
    label: &str,
    kind: &str,
    value: &str,
    max_len: usize,
) -> fmt::Result {
    write!(out, "<p><label for=\"{name}\">")?;
    write_escaped(out, label)?;
    write!(
        out,
        "</label><br><input id=\"{name}\" name=\"{name}\" type=\"{kind}\" maxlength=\"{max_len}\" value=\""
    )?;
    write_escaped(out, value)?;
    out.write_str("\"></p>")
}

fn write_escaped<W: Write>(out: &mut W, text: &str) -> fmt::Result {
    for c in text.chars() {
        match c {
            '&' => out.write_str("&amp;")?,
            '<' => out.write_str("&lt;")?,
            '>' => out.write_str("&gt;")?,
            '"' => out.write_str("&quot;")?,
            '\'' => out.write_str("&#39;")?,
            other => out.write_char(other)?,
        }
    }
    Ok(())
}

/// [`Write`] adapter that silently stops at the buffer's capacity.
pub struct TruncatingWriter<'a, const N: usize>(pub &'a mut String<N>);

impl<const N: usize> Write for TruncatingWriter<'_, N> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        let room = N - self.0.len();
        let cut = floor_char_boundary(s, room);
        // Cannot fail: `cut <= room`.
        let _ = self.0.push_str(&s[..cut]);
        Ok(())
    }
}
