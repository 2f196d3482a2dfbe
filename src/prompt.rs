//! System prompt templating.

use crate::message::{Message, Role};

/// Reasoning model families that take a `developer` message instead of `system`.
const DEVELOPER_ROLE_PREFIXES: &[&str] = &["o1", "o3", "o4"];

/// Role used for the leading instruction message sent to `model`.
pub fn system_role_for(model: &str) -> Role {
    let model = model.to_ascii_lowercase();
    let family = model.rsplit('/').next().unwrap_or(model.as_str());
    let reasoning = DEVELOPER_ROLE_PREFIXES.iter().any(|prefix| {
        family == *prefix
            || family
                .strip_prefix(prefix)
                .is_some_and(|rest| rest.starts_with('-'))
    });
    if reasoning {
        Role::Developer
    } else {
        Role::System
    }
}

/// Leading instruction message for `model`, or `None` for an empty prompt.
pub fn instruction_message(model: &str, prompt: &str) -> Option<Message> {
    if prompt.trim().is_empty() {
        return None;
    }
    Some(match system_role_for(model) {
        Role::Developer => Message::developer(prompt),
        _ => Message::system(prompt),
    })
}

#[derive(Debug, Clone, Default)]
struct Section {
    name: String,
    lines: Vec<String>,
    subsections: Vec<Section>,
}

impl Section {
    fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Self::default()
        }
    }

    fn render(&self, depth: usize, out: &mut String) {
        let indent = "  ".repeat(depth);
        let tag = tag_name(&self.name);
        out.push_str(&format!("{indent}<{tag}>\n"));
        for line in &self.lines {
            out.push_str(&format!("{indent}  {line}\n"));
        }
        for sub in &self.subsections {
            sub.render(depth + 1, out);
        }
        out.push_str(&format!("{indent}</{tag}>\n"));
    }
}

fn tag_name(name: &str) -> String {
    name.trim()
        .chars()
        .map(|c| {
            if c.is_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect()
}

/// Builds a system prompt out of named, tagged sections.
///
/// ```
/// use syndicate::PromptBuilder;
///
/// let prompt = PromptBuilder::new()
///     .text("Role", "You review drafts.")
///     .item("Rules", "Be concise.")
///     .build();
/// assert!(prompt.contains("<role>"));
/// assert!(prompt.contains("- Be concise."));
/// ```
#[derive(Debug, Clone, Default)]
pub struct PromptBuilder {
    sections: Vec<Section>,
}

impl PromptBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    fn section_mut(&mut self, name: &str) -> &mut Section {
        let idx = match self.sections.iter().position(|s| s.name == name) {
            Some(idx) => idx,
            None => {
                self.sections.push(Section::named(name));
                self.sections.len() - 1
            }
        };
        &mut self.sections[idx]
    }

    /// Append free text to `section`, creating it on first use.
    pub fn text(mut self, section: &str, text: impl Into<String>) -> Self {
        self.section_mut(section).lines.push(text.into());
        self
    }

    /// Append a bullet item to `section`.
    pub fn item(mut self, section: &str, item: impl Into<String>) -> Self {
        self.section_mut(section)
            .lines
            .push(format!("- {}", item.into()));
        self
    }

    /// Append free text to `subsection` nested inside `section`.
    pub fn subsection_text(
        mut self,
        section: &str,
        subsection: &str,
        text: impl Into<String>,
    ) -> Self {
        let parent = self.section_mut(section);
        let idx = match parent.subsections.iter().position(|s| s.name == subsection) {
            Some(idx) => idx,
            None => {
                parent.subsections.push(Section::named(subsection));
                parent.subsections.len() - 1
            }
        };
        parent.subsections[idx].lines.push(text.into());
        self
    }

    pub fn build(&self) -> String {
        let mut out = String::new();
        for section in &self.sections {
            section.render(0, &mut out);
        }
        out.trim_end().to_string()
    }
}
