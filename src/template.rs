// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 pipeflow contributors

//! Minimal prompt templates
//!
//! Supports `{{ var }}`, `{{ var.field }}`, `{% for x in var %}...{% endfor %}`,
//! `{% if var %}...{% endif %}` and the `@var` / `$var` shorthands.

use regex::{Captures, Regex};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::OnceLock;

use crate::errors::{PipeflowError, PipeflowResult};
use crate::memory::{StuffContent, WorkingMemory};

fn expression_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\{\{\s*([A-Za-z_][A-Za-z0-9_]*)((?:\.[A-Za-z_][A-Za-z0-9_]*)*)\s*(?:\|[^}]*)?\}\}")
            .expect("valid expression regex")
    })
}

fn for_block_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?s)\{%\s*for\s+([A-Za-z_]\w*)\s+in\s+([A-Za-z_]\w*)\s*%\}(.*?)\{%\s*endfor\s*%\}")
            .expect("valid for regex")
    })
}

fn if_block_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?s)\{%\s*if\s+([A-Za-z_]\w*)\s*%\}(.*?)\{%\s*endif\s*%\}")
            .expect("valid if regex")
    })
}

fn shorthand_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(^|[^\w@$.])[@$]([A-Za-z_][A-Za-z0-9_]*)((?:\.[A-Za-z_][A-Za-z0-9_]*)*)")
            .expect("valid shorthand regex")
    })
}

/// Root names of the variables a template reads
pub fn required_variables(source: &str) -> BTreeSet<String> {
    let mut loop_vars = BTreeSet::new();
    let mut names = BTreeSet::new();

    for caps in for_block_re().captures_iter(source) {
        loop_vars.insert(caps[1].to_string());
        names.insert(caps[2].to_string());
    }
    for caps in if_block_re().captures_iter(source) {
        names.insert(caps[1].to_string());
    }
    for caps in expression_re().captures_iter(source) {
        names.insert(caps[1].to_string());
    }
    for caps in shorthand_re().captures_iter(source) {
        names.insert(caps[2].to_string());
    }

    names.retain(|name| !loop_vars.contains(name) && name != "loop");
    names
}

/// Values available to a template
#[derive(Debug, Clone, Default)]
pub struct TemplateContext {
    values: BTreeMap<String, StuffContent>,
}

impl TemplateContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every entry and alias of a working memory
    pub fn from_memory(memory: &WorkingMemory) -> Self {
        let mut values: BTreeMap<String, StuffContent> = memory
            .iter()
            .map(|(name, stuff)| (name.to_string(), stuff.content.clone()))
            .collect();
        for (alias, _) in memory.aliases() {
            if let Some(stuff) = memory.get_optional(alias) {
                values.insert(alias.to_string(), stuff.content.clone());
            }
        }
        Self { values }
    }

    pub fn insert(&mut self, name: &str, content: StuffContent) {
        self.values.insert(name.to_string(), content);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    fn lookup(&self, root: &str, path: &str) -> Option<String> {
        let content = self.values.get(root)?;
        let fields: Vec<&str> = path.split('.').filter(|f| !f.is_empty()).collect();
        match fields.split_first() {
            None => Some(content.rendered_text()),
            Some((first, [])) => content.field_text(first),
            Some((first, rest)) => match content {
                StuffContent::Structured { value, .. } => {
                    let mut current = value.get(*first)?;
                    for field in rest {
                        current = current.get(*field)?;
                    }
                    Some(match current {
                        serde_json::Value::String(s) => s.clone(),
                        other => other.to_string(),
                    })
                }
                _ => None,
            },
        }
    }
}

/// Render a template against a context
pub fn render(source: &str, context: &TemplateContext) -> PipeflowResult<String> {
    let mut missing = BTreeSet::new();

    let expanded = expand_blocks(source, context, &mut missing)?;

    let substituted = expression_re().replace_all(&expanded, |caps: &Captures| {
        match context.lookup(&caps[1], &caps[2]) {
            Some(value) => value,
            None => {
                missing.insert(format!("{}{}", &caps[1], &caps[2]));
                String::new()
            }
        }
    });

    let rendered = shorthand_re().replace_all(&substituted, |caps: &Captures| {
        match context.lookup(&caps[2], &caps[3]) {
            Some(value) => format!("{}{}", &caps[1], value),
            None => {
                missing.insert(format!("{}{}", &caps[2], &caps[3]));
                caps[0].to_string()
            }
        }
    });

    if !missing.is_empty() {
        return Err(PipeflowError::Template {
            reason: format!(
                "undefined variables: {}",
                missing.into_iter().collect::<Vec<_>>().join(", ")
            ),
        });
    }

    Ok(rendered.into_owned())
}

fn expand_blocks(
    source: &str,
    context: &TemplateContext,
    missing: &mut BTreeSet<String>,
) -> PipeflowResult<String> {
    let mut failure = None;

    let looped = for_block_re().replace_all(source, |caps: &Captures| {
        let Some(collection) = context.values.get(&caps[2]) else {
            missing.insert(caps[2].to_string());
            return String::new();
        };
        let items: Vec<StuffContent> = match collection.as_list() {
            Some(items) => items.to_vec(),
            None => vec![collection.clone()],
        };
        let mut out = String::new();
        for item in items {
            let mut child = context.clone();
            child.insert(&caps[1], item);
            match render(&caps[3], &child) {
                Ok(body) => out.push_str(&body),
                Err(e) => {
                    failure.get_or_insert(e);
                }
            }
        }
        out
    });

    if let Some(e) = failure {
        return Err(e);
    }

    let conditioned = if_block_re().replace_all(&looped, |caps: &Captures| {
        let present = context
            .lookup(&caps[1], "")
            .map_or(false, |value| !value.trim().is_empty());
        if present {
            caps[2].to_string()
        } else {
            String::new()
        }
    });

    Ok(conditioned.into_owned())
}

/// Context restricted to the variables a template needs
pub fn context_for(source: &str, memory: &WorkingMemory) -> TemplateContext {
    let mut context = TemplateContext::new();
    for name in required_variables(source) {
        if let Some(stuff) = memory.get_optional(&name) {
            context.insert(&name, stuff.content.clone());
        }
    }
    context
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_required_variables() {
        let source = "Summarize @text about $topic.\n{{ doc.title }}\n\
                      {% for page in pages %}{{ page.text }} {{ loop.index }}{% endfor %}\n\
                      {% if notes %}{{ notes }}{% endif %} mail me at bob@example.com";
        let names: Vec<_> = required_variables(source).into_iter().collect();
        assert_eq!(names, vec!["doc", "notes", "pages", "text", "topic"]);
    }

    #[test]
    fn test_render_substitutions() {
        let mut context = TemplateContext::new();
        context.insert("topic", StuffContent::text("ownership"));
        context.insert(
            "doc",
            StuffContent::Structured {
                class_name: "Doc".into(),
                value: serde_json::json!({"meta": {"title": "Borrowing"}}),
            },
        );

        let out = render("About $topic: {{ doc.meta.title }}!", &context).unwrap();
        assert_eq!(out, "About ownership: Borrowing!");
    }

    #[test]
    fn test_render_blocks() {
        let mut context = TemplateContext::new();
        context.insert(
            "items",
            StuffContent::list(vec![StuffContent::text("a"), StuffContent::text("b")]),
        );
        context.insert("empty", StuffContent::text(""));

        let out = render(
            "{% for it in items %}[{{ it }}]{% endfor %}{% if empty %}hidden{% endif %}",
            &context,
        )
        .unwrap();
        assert_eq!(out, "[a][b]");
    }

    #[test]
    fn test_render_missing_variable() {
        let context = TemplateContext::new();
        let err = render("Hello {{ name }} and @other", &context).unwrap_err();
        match err {
            PipeflowError::Template { reason } => {
                assert!(reason.contains("name"));
                assert!(reason.contains("other"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
