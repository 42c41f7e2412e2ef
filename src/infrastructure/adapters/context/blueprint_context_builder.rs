//! Blueprint Context Builder
//!
//! 从蓝图和前文摘要组装章节上下文，每个分区截断到各自的预算

use async_trait::async_trait;

use crate::application::ports::{
    BuiltContext, ContextBuilderPort, ContextError, ContextRequest,
};
use crate::domain::blueprint::{BookBlueprint, ChapterBlueprint};
use crate::domain::generation::{estimate_tokens, BudgetSection, SectionSizes, TokenBudget};

/// 与 estimate_tokens 一致：约 4 个字符一个 token
const CHARS_PER_TOKEN: usize = 4;
const CLOSING_TEXT_CHARS: usize = 600;

/// 未截断的各分区原文
#[derive(Debug, Default)]
struct RawSections {
    system_prompt: String,
    narrative: String,
    character: String,
    world: String,
    plot: String,
    style: String,
    chapter_instructions: String,
    previous_summaries: Vec<String>,
    character_states: Vec<String>,
    payoffs_due: Vec<String>,
    open_setups: Vec<String>,
}

impl RawSections {
    fn text(&self, section: BudgetSection) -> String {
        match section {
            BudgetSection::SystemPrompt => self.system_prompt.clone(),
            BudgetSection::Narrative => {
                let mut text = self.previous_summaries.join("\n");
                if !self.narrative.is_empty() {
                    if !text.is_empty() {
                        text.push('\n');
                    }
                    text.push_str(&self.narrative);
                }
                text
            }
            BudgetSection::Character => {
                let mut text = self.character.clone();
                for state in &self.character_states {
                    text.push('\n');
                    text.push_str(state);
                }
                text
            }
            BudgetSection::World => self.world.clone(),
            BudgetSection::Plot => {
                let mut parts = vec![self.plot.clone()];
                parts.extend(self.open_setups.iter().cloned());
                parts.extend(self.payoffs_due.iter().cloned());
                parts.join("\n")
            }
            BudgetSection::Style => self.style.clone(),
            BudgetSection::ChapterInstructions => self.chapter_instructions.clone(),
        }
    }
}

fn truncate_tokens(text: &str, tokens: usize) -> String {
    let max_chars = tokens.saturating_mul(CHARS_PER_TOKEN);
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}

fn tail_chars(text: &str, max_chars: usize) -> &str {
    let count = text.chars().count();
    if count <= max_chars {
        return text;
    }
    match text.char_indices().nth(count - max_chars) {
        Some((idx, _)) => &text[idx..],
        None => text,
    }
}

/// 按数量上限保留列表末尾（最近的）条目，并截断到 token 预算
fn fit_list(items: &[String], tokens: usize) -> Vec<String> {
    let mut kept = Vec::new();
    let mut used = 0;
    for item in items.iter().rev() {
        let cost = estimate_tokens(item);
        if used + cost > tokens {
            break;
        }
        used += cost;
        kept.push(item.clone());
    }
    kept.reverse();
    kept
}

/// 基于蓝图的上下文构建器
#[derive(Debug, Default, Clone)]
pub struct BlueprintContextBuilder;

impl BlueprintContextBuilder {
    pub fn new() -> Self {
        Self
    }

    fn system_prompt(blueprint: &BookBlueprint) -> String {
        let mut prompt = format!(
            "You are a novelist writing the book \"{}\". Stay consistent with the established story.",
            blueprint.title
        );
        if !blueprint.genre.trim().is_empty() {
            prompt.push_str(&format!(" Genre: {}.", blueprint.genre.trim()));
        }
        prompt
    }

    fn raw_sections(
        &self,
        request: &ContextRequest,
        chapter: &ChapterBlueprint,
    ) -> RawSections {
        let blueprint = &request.blueprint;
        let options = &request.options;
        let mut raw = RawSections {
            system_prompt: Self::system_prompt(blueprint),
            narrative: blueprint.premise.trim().to_string(),
            style: blueprint.style_guide.trim().to_string(),
            ..Default::default()
        };

        if options.include_previous_summaries {
            let skip = request
                .previous
                .len()
                .saturating_sub(options.previous_summary_count);
            raw.previous_summaries = request.previous[skip..]
                .iter()
                .map(|d| format!("Chapter {} ({}): {}", d.number, d.title, d.summary))
                .collect();
            if let Some(last) = request.previous.last() {
                let closing = tail_chars(&last.closing_text, CLOSING_TEXT_CHARS).trim();
                if !closing.is_empty() {
                    raw.narrative.push_str(&format!(
                        "\nChapter {} ended with: {}",
                        last.number, closing
                    ));
                }
            }
        }

        if options.include_characters {
            let mut lines = Vec::new();
            for name in &chapter.characters {
                match blueprint.character(name) {
                    Some(profile) => {
                        let mut line = format!("{} ({})", profile.name, profile.role);
                        if !profile.description.is_empty() {
                            line.push_str(&format!(": {}", profile.description));
                        }
                        if !profile.traits.is_empty() {
                            line.push_str(&format!(" [{}]", profile.traits.join(", ")));
                        }
                        lines.push(line);
                    }
                    None => lines.push(name.clone()),
                }
            }
            raw.character = lines.join("\n");
            raw.character_states = blueprint
                .characters
                .iter()
                .filter_map(|c| match c.exit_chapter {
                    Some(exit) if exit < chapter.number => {
                        Some(format!("{} left the story in chapter {}", c.name, exit))
                    }
                    _ if chapter.characters.iter().any(|n| n.eq_ignore_ascii_case(&c.name)) => {
                        Some(format!("{} appears in this chapter", c.name))
                    }
                    _ => None,
                })
                .collect();
        }

        if options.include_locations {
            raw.world = blueprint.world_notes.trim().to_string();
        }

        let mut plot = vec![chapter.synopsis.trim().to_string()];
        plot.extend(
            chapter
                .beats
                .iter()
                .enumerate()
                .map(|(i, beat)| format!("Beat {}: {}", i + 1, beat)),
        );
        raw.plot = plot.join("\n").trim().to_string();
        raw.open_setups = chapter.setups.clone();
        raw.payoffs_due = chapter.payoffs.clone();

        let mut instructions = format!(
            "Write chapter {} \"{}\" of about {} words.",
            chapter.number, chapter.title, chapter.target_words
        );
        if let Some(pov) = &chapter.pov_character {
            instructions.push_str(&format!(" Narrate from {}'s point of view.", pov));
        }
        raw.chapter_instructions = instructions;
        raw
    }

    fn section_cap(request: &ContextRequest, budget: &TokenBudget, section: BudgetSection) -> usize {
        let allocated = budget.get(section);
        match request.options.max_section_tokens {
            Some(cap) => allocated.min(cap),
            None => allocated,
        }
    }
}

#[async_trait]
impl ContextBuilderPort for BlueprintContextBuilder {
    async fn measure(&self, request: &ContextRequest) -> Result<SectionSizes, ContextError> {
        let chapter = request
            .blueprint
            .chapter(request.chapter)
            .map_err(|_| ContextError::ChapterNotFound(request.chapter))?;
        let raw = self.raw_sections(request, chapter);

        Ok(BudgetSection::ALL
            .iter()
            .map(|section| (*section, estimate_tokens(&raw.text(*section))))
            .collect())
    }

    async fn build(
        &self,
        request: &ContextRequest,
        budget: &TokenBudget,
    ) -> Result<BuiltContext, ContextError> {
        let chapter = request
            .blueprint
            .chapter(request.chapter)
            .map_err(|_| ContextError::ChapterNotFound(request.chapter))?;
        let raw = self.raw_sections(request, chapter);
        let cap = |section| Self::section_cap(request, budget, section);

        // 叙事分区：优先保留最近的摘要，剩余预算给前提与衔接
        let narrative_cap = cap(BudgetSection::Narrative);
        let previous_summaries = fit_list(&raw.previous_summaries, narrative_cap / 2);
        let used: usize = previous_summaries.iter().map(|s| estimate_tokens(s)).sum();
        let narrative = truncate_tokens(&raw.narrative, narrative_cap.saturating_sub(used));

        let character_cap = cap(BudgetSection::Character);
        let character_states = fit_list(&raw.character_states, character_cap / 3);
        let used: usize = character_states.iter().map(|s| estimate_tokens(s)).sum();
        let character = truncate_tokens(&raw.character, character_cap.saturating_sub(used));

        let plot_cap = cap(BudgetSection::Plot);
        let payoffs_due = fit_list(&raw.payoffs_due, plot_cap / 3);
        let open_setups = fit_list(&raw.open_setups, plot_cap / 3);
        let used: usize = payoffs_due
            .iter()
            .chain(open_setups.iter())
            .map(|s| estimate_tokens(s))
            .sum();
        let plot = truncate_tokens(&raw.plot, plot_cap.saturating_sub(used));

        let mut built = BuiltContext {
            system_prompt: truncate_tokens(&raw.system_prompt, cap(BudgetSection::SystemPrompt)),
            narrative,
            character,
            world: truncate_tokens(&raw.world, cap(BudgetSection::World)),
            plot,
            style: truncate_tokens(&raw.style, cap(BudgetSection::Style)),
            chapter_instructions: truncate_tokens(
                &raw.chapter_instructions,
                cap(BudgetSection::ChapterInstructions),
            ),
            previous_summaries,
            character_states,
            payoffs_due,
            open_setups,
            estimated_tokens: 0,
        };
        built.estimated_tokens = [
            &built.system_prompt,
            &built.narrative,
            &built.character,
            &built.world,
            &built.plot,
            &built.style,
            &built.chapter_instructions,
        ]
        .iter()
        .map(|s| estimate_tokens(s))
        .sum::<usize>()
            + built
                .previous_summaries
                .iter()
                .chain(&built.character_states)
                .chain(&built.payoffs_due)
                .chain(&built.open_setups)
                .map(|s| estimate_tokens(s))
                .sum::<usize>();

        tracing::debug!(
            chapter = request.chapter,
            estimated_tokens = built.estimated_tokens,
            budget = budget.allocated(),
            "Chapter context built"
        );
        Ok(built)
    }
}
