//! Decoding of raw RFC 822 content into [`Message`]s
//!
//! The body kept is the first leaf part, depth first, that is textual and
//! not an attachment. Transfer encodings and charsets are undone by
//! `mailparse`.

use chrono::{DateTime, TimeZone, Utc};
use mailparse::{addrparse_header, DispositionType, MailAddr, MailHeaderMap, ParsedMail};

use crate::types::{MailError, Message, RawMessage};

/// Decode a raw message
///
/// # Errors
///
/// - [`MailError::Parse`] when the content is not valid MIME
/// - [`MailError::InvalidHeader`] when the `Date` header is missing or unreadable
/// - [`MailError::NoBody`] when no inline text part exists
pub fn parse_message(raw: &RawMessage) -> Result<Message, MailError> {
    let parse_error = |e: mailparse::MailParseError| MailError::Parse {
        id: raw.id,
        message: e.to_string(),
    };

    let parsed = mailparse::parse_mail(&raw.data).map_err(parse_error)?;

    let date = parsed
        .headers
        .get_first_value("Date")
        .and_then(|value| parse_date(&value))
        .ok_or_else(|| MailError::InvalidHeader {
            id: raw.id,
            header: "Date".to_string(),
        })?;

    let body = inline_text(&parsed)
        .ok_or(MailError::NoBody { id: raw.id })?
        .get_body()
        .map_err(parse_error)?;

    Ok(Message {
        id: raw.id,
        from: addresses(&parsed, "From"),
        to: addresses(&parsed, "To"),
        subject: parsed.headers.get_first_value("Subject").unwrap_or_default(),
        date,
        body,
    })
}

fn parse_date(value: &str) -> Option<DateTime<Utc>> {
    let timestamp = mailparse::dateparse(value).ok()?;
    Utc.timestamp_opt(timestamp, 0).single()
}

/// Every address of every `header` occurrence, groups flattened, in order
fn addresses(parsed: &ParsedMail<'_>, header: &str) -> Vec<String> {
    let mut out = Vec::new();

    for value in parsed.headers.get_all_headers(header) {
        let Ok(list) = addrparse_header(value) else {
            continue;
        };
        for addr in list.iter() {
            match addr {
                MailAddr::Single(info) => out.push(info.addr.clone()),
                MailAddr::Group(group) => {
                    out.extend(group.addrs.iter().map(|info| info.addr.clone()))
                }
            }
        }
    }

    out
}

fn inline_text<'m, 'd>(part: &'m ParsedMail<'d>) -> Option<&'m ParsedMail<'d>> {
    if part.subparts.is_empty() {
        let attachment = matches!(
            part.get_content_disposition().disposition,
            DispositionType::Attachment
        );
        let text = part.ctype.mimetype.to_ascii_lowercase().starts_with("text/");
        return (text && !attachment).then_some(part);
    }

    part.subparts.iter().find_map(inline_text)
}
