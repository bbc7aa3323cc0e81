/// Parses scraped `available/total` text into `(available, total)`.
///
/// Fails soft: anything that is not two non-negative integers separated by a
/// single `/`, or where `available > total`, yields `(0, 0)`. Callers treat
/// `(0, 0)` as unavailable, so a scraping glitch never looks like an open seat.
pub fn parse_availability(text: &str) -> (u32, u32) {
    let Some((available, total)) = text.split_once('/') else {
        return (0, 0);
    };

    match (parse_count(available), parse_count(total)) {
        (Some(available), Some(total)) if available <= total => (available, total),
        _ => (0, 0),
    }
}

fn parse_count(part: &str) -> Option<u32> {
    let part = part.trim();
    if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    part.parse().ok()
}
