//! Appending a completed exchange to a transcript

use super::transcript::{Transcript, Turn};

/// Append the user's utterance and the model's reply, in that order
pub fn merge_turn(mut transcript: Transcript, utterance: &str, reply: &str) -> Transcript {
    transcript.push(Turn::user(utterance));
    transcript.push(Turn::model(reply));
    transcript
}
