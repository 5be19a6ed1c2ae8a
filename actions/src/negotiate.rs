//! Content negotiation from the `Accept` header.

use axum::http::HeaderMap;
use axum::http::header::ACCEPT;

pub const MIME_HAL: &str = "application/hal+json";
pub const MIME_JSON: &str = "application/json";
pub const MIME_EVENT_STREAM: &str = "text/event-stream";
pub const MIME_RAW: &str = "application/octet-stream";

/// Representation kind selected for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Representation {
    /// HAL/JSON document.
    Structured,
    /// Server-sent event stream.
    EventStream,
    /// Raw bytes.
    Raw,
    /// Nothing the client accepts is offered.
    Unacceptable,
}

/// Offered media types in server preference order.
const OFFERS: [(&str, Representation); 4] = [
    (MIME_HAL, Representation::Structured),
    (MIME_JSON, Representation::Structured),
    (MIME_EVENT_STREAM, Representation::EventStream),
    (MIME_RAW, Representation::Raw),
];

/// Resolve the representation for a request's headers.
///
/// A missing or blank `Accept` header selects [`Representation::Structured`].
pub fn negotiate(headers: &HeaderMap) -> Representation {
    let accept = headers
        .get_all(ACCEPT)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .collect::<Vec<_>>()
        .join(",");
    negotiate_accept(&accept)
}

/// Resolve the representation for a raw `Accept` header value.
pub fn negotiate_accept(accept: &str) -> Representation {
    if accept.trim().is_empty() {
        return Representation::Structured;
    }

    let ranges: Vec<MediaRange<'_>> = accept.split(',').filter_map(MediaRange::parse).collect();

    let mut best: Option<(f32, Representation)> = None;
    for (offer, representation) in OFFERS {
        let Some(q) = quality_for(offer, &ranges) else {
            continue;
        };
        if q <= 0.0 {
            continue;
        }
        // Strictly greater keeps the earlier offer on ties.
        if best.is_none_or(|(best_q, _)| q > best_q) {
            best = Some((q, representation));
        }
    }

    best.map_or(Representation::Unacceptable, |(_, representation)| {
        representation
    })
}

/// The quality of the most specific range matching `offer`.
fn quality_for(offer: &str, ranges: &[MediaRange<'_>]) -> Option<f32> {
    let (offer_type, offer_subtype) = offer.split_once('/')?;
    ranges
        .iter()
        .filter_map(|range| {
            range
                .specificity(offer_type, offer_subtype)
                .map(|specificity| (specificity, range.q))
        })
        .max_by_key(|(specificity, _)| *specificity)
        .map(|(_, q)| q)
}

#[derive(Debug)]
struct MediaRange<'a> {
    kind: &'a str,
    subtype: &'a str,
    q: f32,
}

impl<'a> MediaRange<'a> {
    fn parse(raw: &'a str) -> Option<Self> {
        let mut parts = raw.split(';');
        let (kind, subtype) = parts.next()?.trim().split_once('/')?;
        let (kind, subtype) = (kind.trim(), subtype.trim());
        if kind.is_empty() || subtype.is_empty() {
            return None;
        }

        let mut q = 1.0;
        for param in parts {
            let Some((name, value)) = param.split_once('=') else {
                continue;
            };
            if name.trim().eq_ignore_ascii_case("q") {
                q = value
                    .trim()
                    .parse::<f32>()
                    .ok()
                    .filter(|q| (0.0..=1.0).contains(q))
                    .unwrap_or(0.0);
            }
        }

        Some(Self { kind, subtype, q })
    }

    /// 2 for an exact match, 1 for `type/*`, 0 for `*/*`.
    fn specificity(&self, kind: &str, subtype: &str) -> Option<u8> {
        if self.kind == "*" && self.subtype == "*" {
            return Some(0);
        }
        if !self.kind.eq_ignore_ascii_case(kind) {
            return None;
        }
        if self.subtype == "*" {
            return Some(1);
        }
        self.subtype.eq_ignore_ascii_case(subtype).then_some(2)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn missing_accept_defaults_to_structured() {
        assert_eq!(negotiate(&HeaderMap::new()), Representation::Structured);
        assert_eq!(negotiate_accept("  "), Representation::Structured);
    }

    #[test]
    fn exact_types_select_their_kind() {
        assert_eq!(negotiate_accept(MIME_HAL), Representation::Structured);
        assert_eq!(negotiate_accept(MIME_JSON), Representation::Structured);
        assert_eq!(
            negotiate_accept(MIME_EVENT_STREAM),
            Representation::EventStream
        );
        assert_eq!(negotiate_accept(MIME_RAW), Representation::Raw);
    }

    #[test]
    fn wildcard_selects_first_offer() {
        assert_eq!(negotiate_accept("*/*"), Representation::Structured);
        assert_eq!(negotiate_accept("text/*"), Representation::EventStream);
    }

    #[test]
    fn quality_values_are_respected() {
        assert_eq!(
            negotiate_accept("application/json;q=0.5, text/event-stream"),
            Representation::EventStream
        );
        assert_eq!(
            negotiate_accept("*/*;q=0.1, application/octet-stream;q=0.9"),
            Representation::Raw
        );
    }

    #[test]
    fn specific_range_overrides_wildcard() {
        assert_eq!(
            negotiate_accept("*/*, application/hal+json;q=0, application/json;q=0"),
            Representation::EventStream
        );
    }

    #[test]
    fn unsupported_types_are_unacceptable() {
        assert_eq!(negotiate_accept("text/html"), Representation::Unacceptable);
        assert_eq!(
            negotiate_accept("application/json;q=0"),
            Representation::Unacceptable
        );
        assert_eq!(negotiate_accept("garbage"), Representation::Unacceptable);
    }

    #[test]
    fn same_header_always_resolves_the_same() {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("text/event-stream;q=0.8, application/json;q=0.8"),
        );
        let first = negotiate(&headers);
        for _ in 0..10 {
            assert_eq!(negotiate(&headers), first);
        }
        assert_eq!(first, Representation::Structured);
    }
}
