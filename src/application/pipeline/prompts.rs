//! Prompt 组装与模型输出解析

use crate::application::ports::BuiltContext;
use crate::domain::blueprint::ChapterBlueprint;

const MAX_OUTLINE_BEATS: usize = 12;

/// 取文本末尾最多 `max_chars` 个字符
pub fn tail(text: &str, max_chars: usize) -> &str {
    let count = text.chars().count();
    if count <= max_chars {
        return text;
    }
    let skip = count - max_chars;
    match text.char_indices().nth(skip) {
        Some((idx, _)) => &text[idx..],
        None => text,
    }
}

/// 截断到最多 `max_chars` 个字符
pub fn truncate(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

fn push_section(out: &mut String, title: &str, body: &str) {
    let body = body.trim();
    if body.is_empty() {
        return;
    }
    out.push_str("## ");
    out.push_str(title);
    out.push('\n');
    out.push_str(body);
    out.push_str("\n\n");
}

fn push_list(out: &mut String, title: &str, items: &[String]) {
    if items.is_empty() {
        return;
    }
    let body = items
        .iter()
        .map(|i| format!("- {}", i))
        .collect::<Vec<_>>()
        .join("\n");
    push_section(out, title, &body);
}

/// 上下文块（所有分区拼接）
pub fn context_block(context: &BuiltContext) -> String {
    let mut out = String::new();
    push_section(&mut out, "Story so far", &context.narrative);
    push_list(&mut out, "Previous chapters", &context.previous_summaries);
    push_section(&mut out, "Characters", &context.character);
    push_list(&mut out, "Character states", &context.character_states);
    push_section(&mut out, "World", &context.world);
    push_section(&mut out, "Plot", &context.plot);
    push_list(&mut out, "Setups to plant", &context.open_setups);
    push_list(&mut out, "Payoffs due", &context.payoffs_due);
    push_section(&mut out, "Style", &context.style);
    push_section(&mut out, "Chapter instructions", &context.chapter_instructions);
    out
}

fn chapter_header(chapter: &ChapterBlueprint) -> String {
    let mut out = format!("Chapter {}: {}\n", chapter.number, chapter.title);
    if !chapter.synopsis.trim().is_empty() {
        out.push_str(&format!("Synopsis: {}\n", chapter.synopsis.trim()));
    }
    if let Some(pov) = chapter.pov_character.as_deref() {
        out.push_str(&format!("Point of view: {}\n", pov));
    }
    out
}

pub fn outline_prompt(
    context: &BuiltContext,
    chapter: &ChapterBlueprint,
    instructions: &[String],
) -> String {
    let mut out = context_block(context);
    out.push_str(&chapter_header(chapter));
    push_list(&mut out, "Planned beats", &chapter.beats);
    push_list(&mut out, "Author instructions", instructions);
    out.push_str(&format!(
        "Write a numbered scene outline with exactly {} entries, one line per scene.\n",
        chapter.planned_scene_count()
    ));
    out
}

pub fn scene_prompt(
    context: &BuiltContext,
    chapter: &ChapterBlueprint,
    outline: &[String],
    index: usize,
    previous_tail: Option<&str>,
    instructions: &[String],
) -> String {
    let mut out = context_block(context);
    out.push_str(&chapter_header(chapter));
    let numbered: Vec<String> = outline
        .iter()
        .enumerate()
        .map(|(i, beat)| format!("{}. {}", i + 1, beat))
        .collect();
    push_section(&mut out, "Outline", &numbered.join("\n"));
    if let Some(prev) = previous_tail.filter(|t| !t.trim().is_empty()) {
        push_section(&mut out, "Previous scene ends with", prev);
    }
    push_list(&mut out, "Author instructions", instructions);
    let words = chapter.target_words as usize / outline.len().max(1);
    out.push_str(&format!(
        "Write scene {} of {} ({}) in about {} words. Output prose only.\n",
        index + 1,
        outline.len(),
        outline.get(index).map(String::as_str).unwrap_or_default(),
        words
    ));
    out
}

pub fn revision_prompt(
    context: &BuiltContext,
    chapter: &ChapterBlueprint,
    text: &str,
    instructions: &[String],
) -> String {
    let mut out = context_block(context);
    out.push_str(&chapter_header(chapter));
    push_list(&mut out, "Revise to address", instructions);
    push_section(&mut out, "Current draft", text);
    out.push_str("Rewrite the full chapter addressing every point above. Output prose only.\n");
    out
}

/// 解析大纲：优先取带编号/列表符号的行，否则取所有非空行
pub fn parse_outline(text: &str) -> Vec<String> {
    let lines: Vec<&str> = text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();

    let marked: Vec<String> = lines
        .iter()
        .filter_map(|l| strip_list_marker(l))
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect();

    let beats = if marked.is_empty() {
        lines
            .into_iter()
            .filter(|l| !l.starts_with('#'))
            .map(str::to_string)
            .collect()
    } else {
        marked
    };
    beats.into_iter().take(MAX_OUTLINE_BEATS).collect()
}

fn strip_list_marker(line: &str) -> Option<&str> {
    for bullet in ["- ", "* ", "• "] {
        if let Some(rest) = line.strip_prefix(bullet) {
            return Some(rest.trim());
        }
    }
    let digits = line.chars().take_while(|c| c.is_ascii_digit()).count();
    if digits == 0 {
        return None;
    }
    let rest = &line[digits..];
    for sep in [".", ")", "、", ":", "："] {
        if let Some(rest) = rest.strip_prefix(sep) {
            return Some(rest.trim());
        }
    }
    None
}

/// 由大纲生成确定性的章节摘要
pub fn summarize(title: &str, outline: &[String], max_chars: usize) -> String {
    let joined = outline.join("; ");
    let summary = if joined.is_empty() {
        title.to_string()
    } else {
        format!("{}: {}", title, joined)
    };
    truncate(&summary, max_chars).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_numbered_outline() {
        let text = "Here is the outline:\n1. Mara finds the letter\n2) The storm arrives\n3、灯塔熄灭\n";
        assert_eq!(
            parse_outline(text),
            vec!["Mara finds the letter", "The storm arrives", "灯塔熄灭"]
        );
    }

    #[test]
    fn test_parse_unmarked_outline() {
        let text = "# Outline\nOpening on the pier\n\nThe quarrel\n";
        assert_eq!(parse_outline(text), vec!["Opening on the pier", "The quarrel"]);
    }

    #[test]
    fn test_parse_outline_caps_beats() {
        let text: String = (1..=20).map(|i| format!("{}. beat\n", i)).collect();
        assert_eq!(parse_outline(&text).len(), 12);
    }

    #[test]
    fn test_tail_and_truncate_are_char_safe() {
        assert_eq!(tail("潮水涨了", 2), "涨了");
        assert_eq!(tail("abc", 5), "abc");
        assert_eq!(truncate("潮水涨了", 3), "潮水涨");
    }

    #[test]
    fn test_summarize() {
        let outline = vec!["a".to_string(), "b".to_string()];
        assert_eq!(summarize("Ch1", &outline, 100), "Ch1: a; b");
        assert_eq!(summarize("Ch1", &[], 100), "Ch1");
    }
}
