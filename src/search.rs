use crate::error::{Error, Result};

/// find_sequence returns the index of the first occurrence of `needle` that
/// lies entirely within `haystack`, or `None` when there is no such occurrence.
///
/// The scan anchors on the first byte of `needle` and then verifies the
/// remaining bytes; on a mismatch it resumes from the next candidate. Needles
/// are expected to be short (the 4-byte CRLFCRLF header terminator).
pub fn find_sequence(haystack: &[u8], needle: &[u8]) -> Result<Option<usize>> {
    let Some((&first, rest)) = needle.split_first() else {
        return Err(Error::InvalidArgument(
            "sequence length must be greater than zero".to_string(),
        ));
    };

    let mut from = 0;
    while let Some(offset) = haystack[from..].iter().position(|&b| b == first) {
        let start = from + offset;

        // Candidate would run past the end of the range
        if start + needle.len() > haystack.len() {
            return Ok(None);
        }

        if &haystack[start + 1..start + needle.len()] == rest {
            return Ok(Some(start));
        }

        from = start + 1;
    }

    Ok(None)
}
