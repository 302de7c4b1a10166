use once_cell::sync::Lazy;
use regex::Regex;

use crate::matrix::RemoteEvent;

static MXC_URL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^mxc://([^/]+)/(.+)$").expect("mxc pattern is valid"));

const ELIGIBLE_EVENT_TYPES: &[&str] = &["m.room.message", "m.sticker"];

/// Turns one remote timeline event into the outbound local-message body, or
/// `None` when the event is not bridgeable (wrong type, unsupported msgtype).
///
/// The sender is quoted in backticks so it is rendered as literal text and
/// never parsed as a local mention.
pub fn translate(event: &RemoteEvent) -> Option<String> {
    if !ELIGIBLE_EVENT_TYPES.contains(&event.event_type.as_str()) {
        return None;
    }

    let body = event.content.body.clone().unwrap_or_default();
    let rendered = match event.content.msgtype.as_deref() {
        Some("m.text") => body,
        Some("m.image") => render_media(&body, event.content.url.as_deref(), true),
        Some("m.file") | Some("m.video") => {
            render_media(&body, event.content.url.as_deref(), false)
        }
        _ => return None,
    };

    Some(format!("[`{}`]: {}", event.sender, rendered))
}

/// Rewrites an `mxc://server/media-id` URL into the direct-download form.
/// A URL that does not match the pattern leaves the raw body untouched;
/// degraded output, not an error.
fn render_media(body: &str, url: Option<&str>, inline_image: bool) -> String {
    let Some(url) = url else {
        return body.to_string();
    };
    let Some(captures) = MXC_URL.captures(url) else {
        return body.to_string();
    };

    let server = &captures[1];
    let media_id = &captures[2];
    let download_url = format!("https://{server}/_matrix/media/v3/download/{server}/{media_id}");

    if inline_image {
        format!("![{body}]({download_url})")
    } else {
        format!("[{body}]({download_url})")
    }
}
