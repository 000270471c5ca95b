//! Request shapes for the two generation calls of an invocation.

use gardenstate_core::Part;

use super::context::ConversationTurn;

const PERSONA: &str = "You are a helpful gardening assistant. You help users track and care for their plants through conversational entries.

You should:
- Provide helpful, accurate gardening advice
- Ask clarifying questions when needed
- Help identify plant problems and solutions
- Suggest care routines and improvements
- Be encouraging and supportive
- Keep responses concise but informative";

const IMAGE_INSTRUCTION: &str = "Please analyze all the provided images from this conversation and respond to the user's latest message about their plant. Consider the visual information from all images when providing advice.";

const TEXT_INSTRUCTION: &str = "Please respond to the user's latest message.";

const SUMMARY_SYSTEM: &str = "You are helping to summarize plant care conversations. Be concise and focus on key information that would be useful for future plant care.";

const NAME_AND_SUMMARY_TASK: &str = "Additionally, please suggest a short, descriptive name (3-5 words) for this conversation entry based on the main topic discussed. Format your response exactly like this:\n\nENTRY_NAME: [suggested name]\nSUMMARY: [your summary]";

const SUMMARY_TASK: &str = "Please provide a brief summary of this conversation for future reference. Format your response exactly like this:\n\nSUMMARY: [your summary]";

/// Persona plus context, closing with the per-message instruction.
pub fn system_prompt(context: &str) -> String {
    format!(
        "{}\n\n{}\n\nPlease respond to the user's message about their plant.",
        PERSONA, context
    )
}

/// `User: …` / `Assistant: …` lines separated by blank lines, optionally
/// noting how many images a turn carried.
pub fn render_transcript(turns: &[ConversationTurn], mark_images: bool) -> String {
    turns
        .iter()
        .map(|turn| {
            let mut line = format!("{}: {}", turn.speaker.label(), turn.text);
            if mark_images && !turn.images.is_empty() {
                line.push_str(&format!(" [shared {} image(s)]", turn.images.len()));
            }
            line
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Parts for the reply call: one text part, then any resolved images.
/// Without images the request is text-only and skips the image instruction.
pub fn reply_request(context: &str, recent: &[ConversationTurn], images: Vec<Part>) -> Vec<Part> {
    let instruction = if images.is_empty() {
        TEXT_INSTRUCTION
    } else {
        IMAGE_INSTRUCTION
    };

    let prompt = format!(
        "{}\n\nConversation history:\n{}\n\n{}",
        system_prompt(context),
        render_transcript(recent, true),
        instruction
    );

    let mut parts = Vec::with_capacity(images.len() + 1);
    parts.push(Part::Text(prompt));
    parts.extend(images);
    parts
}

/// Parts for the summary call over the full history. `request_name` adds the
/// `ENTRY_NAME:` instruction.
pub fn summary_request(all_turns: &[ConversationTurn], request_name: bool) -> Vec<Part> {
    let task = if request_name {
        NAME_AND_SUMMARY_TASK
    } else {
        SUMMARY_TASK
    };

    let prompt = format!(
        "{}\n\nConversation:\n{}\n\nBased on this conversation, \n\n{}",
        SUMMARY_SYSTEM,
        render_transcript(all_turns, false),
        task
    );

    vec![Part::Text(prompt)]
}

// ============================================================================
// TESTS
// ============================================================================
