//! Sentence-boundary chunking for read mode.
//!
//! Text is cut into sentences (a run of text followed by a run of `.`, `!` or `?`),
//! which are greedily packed into segments of at most `max_len` characters.
//! A sentence longer than `max_len` is packed word by word instead. A single word
//! longer than `max_len` is emitted as its own oversized segment.

/// Default maximum segment length in characters.
pub const DEFAULT_MAX_CHUNK_LEN: usize = 500;

/// Read mode narrates at most this many segments per request.
pub const READ_MODE_MAX_CHUNKS: usize = 5;

/// Split `text` into ordered segments of at most `max_len` characters.
///
/// Text that already fits is returned unchanged as a single segment. Segments are
/// whitespace-trimmed and empty segments are dropped.
pub fn split(text: &str, max_len: usize) -> Vec<String> {
    let max_len = max_len.max(1);
    if char_len(text) <= max_len {
        return vec![text.to_owned()];
    }

    let sentences = sentences(text);
    if sentences.len() <= 1 {
        return pack_words(text, max_len);
    }

    let mut chunks = Vec::new();
    let mut current = String::new();

    for sentence in sentences {
        if char_len(&current) + char_len(sentence) <= max_len {
            current.push_str(sentence);
            continue;
        }

        push_trimmed(&mut chunks, &current);
        current.clear();

        if char_len(sentence) > max_len {
            chunks.extend(pack_words(sentence, max_len));
        } else {
            current.push_str(sentence);
        }
    }
    push_trimmed(&mut chunks, &current);

    chunks
}

/// Cut text into sentences. Concatenating the result reproduces the input exactly;
/// trailing text without a terminator forms the final sentence.
fn sentences(text: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut start = 0;
    let mut in_terminators = false;

    for (i, c) in text.char_indices() {
        let is_terminator = matches!(c, '.' | '!' | '?');
        if in_terminators && !is_terminator {
            out.push(&text[start..i]);
            start = i;
        }
        in_terminators = is_terminator;
    }
    if start < text.len() {
        out.push(&text[start..]);
    }
    out
}

/// Greedy word-level packing. Words are re-joined with single spaces.
fn pack_words(text: &str, max_len: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();

    for word in text.split_whitespace() {
        if current.is_empty() {
            current.push_str(word);
        } else if char_len(&current) + 1 + char_len(word) <= max_len {
            current.push(' ');
            current.push_str(word);
        } else {
            chunks.push(std::mem::take(&mut current));
            current.push_str(word);
        }
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

fn push_trimmed(chunks: &mut Vec<String>, segment: &str) {
    let trimmed = segment.trim();
    if !trimmed.is_empty() {
        chunks.push(trimmed.to_owned());
    }
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}
