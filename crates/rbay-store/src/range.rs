//! Index range resolution shared by list and sorted-set reads

/// Resolve inclusive, possibly negative `start..=stop` indices against a
/// sequence of `len` elements, the way the store does for `LRANGE`/`ZRANGE`.
///
/// Returns `None` when the range selects nothing.
pub fn resolve(len: usize, start: i64, stop: i64) -> Option<(usize, usize)> {
    let len = len as i64;
    if len == 0 {
        return None;
    }

    let start = if start < 0 { (len + start).max(0) } else { start };
    let stop = if stop < 0 { len + stop } else { stop.min(len - 1) };

    if start > stop || start >= len || stop < 0 {
        return None;
    }
    Some((start as usize, stop as usize))
}
