use quill_domain::errors::BacktestError;

pub(crate) const CANCELLED: &str = "cancelled";

pub(crate) fn to_hex_short(bytes: &[u8], chars: usize) -> String {
    const HEX: &[u8; 16] = b"0123456789abcdef";
    let mut out = String::with_capacity(chars);
    for b in bytes {
        out.push(HEX[(b >> 4) as usize] as char);
        if out.len() >= chars {
            break;
        }
        out.push(HEX[(b & 0x0f) as usize] as char);
        if out.len() >= chars {
            break;
        }
    }
    out
}

/// Domain errors cross the use-case boundary as strings; cancellation keeps a
/// fixed message so callers can tell it apart from a failed run.
pub(crate) fn engine_error(err: BacktestError) -> String {
    match err {
        BacktestError::Cancelled => CANCELLED.to_string(),
        other => other.to_string(),
    }
}

pub(crate) fn should_cancelled(should_cancel: Option<&(dyn Fn() -> bool + Sync)>) -> bool {
    should_cancel.map(|f| f()).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn to_hex_short_truncates_odd_lengths() {
        assert_eq!(to_hex_short(&[0xab, 0xcd, 0xef], 3), "abc");
        assert_eq!(to_hex_short(&[0x01, 0x02], 12), "0102");
    }

    #[test]
    fn cancellation_keeps_a_stable_message() {
        assert_eq!(engine_error(BacktestError::Cancelled), CANCELLED);
        assert!(engine_error(BacktestError::UnknownEngine("x".to_string())).contains("unknown engine"));
    }
}
