/// Format milliseconds as `m:ss`, truncating sub-second remainders.
///
/// Minutes are not wrapped into hours: 3_661_000 ms is `61:01`.
pub fn format_ms(ms: u64) -> String {
    let seconds = ms / 1000;
    format!("{}:{:02}", seconds / 60, seconds % 60)
}
