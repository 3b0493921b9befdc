//! System prompt assembly

use groupchat_core::MemoryEntry;

const MEMORY_HEADER: &str = "[Memory] Important things you remember about this group chat:";

/// Renders memories as a numbered block to append to a system prompt.
/// Returns an empty string when there is nothing to remember.
pub fn format_memories_for_prompt<S: AsRef<str>>(memories: &[S]) -> String {
    if memories.is_empty() {
        return String::new();
    }

    let lines = memories
        .iter()
        .enumerate()
        .map(|(i, m)| format!("{}. {}", i + 1, m.as_ref()))
        .collect::<Vec<_>>()
        .join("\n");

    format!("\n\n{}\n{}\n", MEMORY_HEADER, lines)
}

/// Base prompt plus the memory digest. `memories` arrive newest first from
/// the store and are listed oldest first.
pub fn build_system_prompt(base: &str, memories: &[MemoryEntry]) -> String {
    let chronological: Vec<&str> = memories.iter().rev().map(|m| m.text.as_str()).collect();
    format!("{}{}", base, format_memories_for_prompt(&chronological))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_memories_render_nothing() {
        let none: [&str; 0] = [];
        assert_eq!(format_memories_for_prompt(&none), "");
        assert_eq!(build_system_prompt("You are terse.", &[]), "You are terse.");
    }

    #[test]
    fn test_numbered_block() {
        let block = format_memories_for_prompt(&["Alice likes tea", "Standup is at 10"]);
        assert_eq!(
            block,
            "\n\n[Memory] Important things you remember about this group chat:\n\
             1. Alice likes tea\n2. Standup is at 10\n"
        );
        assert_eq!(
            block,
            format_memories_for_prompt(&["Alice likes tea", "Standup is at 10"])
        );
    }

    #[test]
    fn test_system_prompt_lists_oldest_first() {
        let newest_first = vec![MemoryEntry::new("second"), MemoryEntry::new("first")];
        let prompt = build_system_prompt("base", &newest_first);

        assert!(prompt.starts_with("base\n\n[Memory]"));
        let first = prompt.find("1. first").unwrap();
        let second = prompt.find("2. second").unwrap();
        assert!(first < second);
    }
}
