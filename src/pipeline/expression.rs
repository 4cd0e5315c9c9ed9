//! Keyword heuristic picking the avatar's face and gesture for a reply.

use super::messages::{Animation, FacialExpression};

const SAD_WORDS: &[&str] = &["sorry", "sad", "unfortunately"];
const FUNNY_WORDS: &[&str] = &["haha", "funny", "laugh"];
const SURPRISED_WORDS: &[&str] = &["wow", "amazing", "incredible"];

/// Expression and animation for a chat reply. Case-insensitive substring match;
/// the first matching group wins.
pub fn classify(reply: &str) -> (FacialExpression, Animation) {
    let lower = reply.to_lowercase();
    let has_any = |words: &[&str]| words.iter().any(|w| lower.contains(w));

    if has_any(SAD_WORDS) {
        (FacialExpression::Sad, Animation::Talking2)
    } else if has_any(FUNNY_WORDS) {
        (FacialExpression::Smile, Animation::Laughing)
    } else if has_any(SURPRISED_WORDS) {
        (FacialExpression::Surprised, Animation::Talking1)
    } else {
        (FacialExpression::Default, Animation::Talking0)
    }
}

/// Read-mode animation alternates by chunk parity.
pub fn read_animation(index: usize) -> Animation {
    if index % 2 == 0 {
        Animation::Talking0
    } else {
        Animation::Talking1
    }
}
