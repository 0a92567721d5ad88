//! CSS inlining for HTML mail bodies.
//!
//! Mail clients ignore most `<style>` blocks, so rules are copied onto each
//! matching element's `style` attribute and `class` attributes are removed.
//! Rules that cannot be inlined (at-rules, dynamic pseudo-classes) stay in a
//! single `<style>` element.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use lol_html::html_content::ContentType;
use lol_html::{RewriteStrSettings, Selector, element, rewrite_str, text};

use super::RenderError;

const ORIGINAL_STYLE_ATTR: &str = "data-inline-original-style";

/// Inline `<style>` rules into element `style` attributes.
///
/// The cascade follows selector specificity and source order; `!important`
/// declarations survive with their flag, and an element's own `style`
/// attribute beats every non-important rule.
pub fn inline_css(html: &str) -> Result<String, RenderError> {
    let stylesheet = parse_stylesheet(&collect_stylesheet(html)?);
    apply_stylesheet(html, stylesheet)
}

fn collect_stylesheet(html: &str) -> Result<String, RenderError> {
    let css = Rc::new(RefCell::new(String::new()));

    rewrite_str(
        html,
        RewriteStrSettings {
            element_content_handlers: vec![text!("style", {
                let css = Rc::clone(&css);
                move |chunk| {
                    let mut css = css.borrow_mut();
                    css.push_str(chunk.as_str());
                    if chunk.last_in_text_node() {
                        css.push('\n');
                    }
                    Ok(())
                }
            })],
            ..RewriteStrSettings::default()
        },
    )
    .map_err(inline_error)?;

    Ok(css.take())
}

fn apply_stylesheet(html: &str, stylesheet: Stylesheet) -> Result<String, RenderError> {
    let Stylesheet { rules, retained } = stylesheet;
    let mut handlers = Vec::with_capacity(rules.len() + 3);

    handlers.push(element!("*", |el| {
        if let Some(style) = el.get_attribute("style") {
            el.set_attribute(ORIGINAL_STYLE_ATTR, &style)?;
            el.remove_attribute("style");
        }
        Ok(())
    }));

    for rule in rules {
        let declarations = rule.declarations;
        handlers.push(element!(rule.selector.as_str(), move |el| {
            let mut style = el
                .get_attribute("style")
                .map(|value| parse_declarations(&value))
                .unwrap_or_default();
            for declaration in &declarations {
                merge(&mut style, declaration);
            }
            el.set_attribute("style", &serialize(&style))?;
            Ok(())
        }));
    }

    handlers.push(element!("*", |el| {
        el.remove_attribute("class");
        if let Some(original) = el.get_attribute(ORIGINAL_STYLE_ATTR) {
            el.remove_attribute(ORIGINAL_STYLE_ATTR);
            let mut style = el
                .get_attribute("style")
                .map(|value| parse_declarations(&value))
                .unwrap_or_default();
            for declaration in parse_declarations(&original) {
                merge(&mut style, &declaration);
            }
            el.set_attribute("style", &serialize(&style))?;
        }
        if el
            .get_attribute("style")
            .is_some_and(|value| value.trim().is_empty())
        {
            el.remove_attribute("style");
        }
        Ok(())
    }));

    let kept_one = Rc::new(Cell::new(false));
    handlers.push(element!("style", {
        let kept_one = Rc::clone(&kept_one);
        move |el| {
            if retained.trim().is_empty() || kept_one.get() {
                el.remove();
            } else {
                el.set_inner_content(&retained, ContentType::Html);
                kept_one.set(true);
            }
            Ok(())
        }
    }));

    rewrite_str(
        html,
        RewriteStrSettings {
            element_content_handlers: handlers,
            ..RewriteStrSettings::default()
        },
    )
    .map_err(inline_error)
}

fn inline_error(err: impl std::fmt::Display) -> RenderError {
    RenderError::Inline {
        message: err.to_string(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Declaration {
    property: String,
    value: String,
    important: bool,
}

#[derive(Debug)]
struct Rule {
    selector: String,
    specificity: (u32, u32, u32),
    order: usize,
    declarations: Vec<Declaration>,
}

#[derive(Debug, Default)]
struct Stylesheet {
    /// Inlineable rules in cascade order.
    rules: Vec<Rule>,
    /// CSS text that has to stay in a `<style>` element.
    retained: String,
}

fn parse_stylesheet(css: &str) -> Stylesheet {
    let css = strip_comments(css);
    let mut stylesheet = Stylesheet::default();
    let mut rest = css.as_str();
    let mut order = 0usize;

    while let Some(open) = rest.find('{') {
        let Some(close) = matching_brace(&rest[open..]).map(|offset| open + offset) else {
            break;
        };
        let mut prelude = rest[..open].trim();
        let block = &rest[open + 1..close];
        rest = &rest[close + 1..];

        // Block-less at-statements such as `@charset "utf-8";` end up in front of the next prelude.
        if let Some((statements, tail)) = prelude.rsplit_once(';') {
            stylesheet.retained.push_str(statements.trim());
            stylesheet.retained.push_str(";\n");
            prelude = tail.trim();
        }

        if prelude.starts_with('@') {
            stylesheet
                .retained
                .push_str(&format!("{prelude} {{{block}}}\n"));
            continue;
        }

        let declarations = parse_declarations(block);
        for selector in prelude.split(',').map(str::trim) {
            if selector.is_empty() {
                continue;
            }
            if selector.parse::<Selector>().is_ok() {
                stylesheet.rules.push(Rule {
                    selector: selector.to_string(),
                    specificity: specificity(selector),
                    order,
                    declarations: declarations.clone(),
                });
                order += 1;
            } else {
                stylesheet
                    .retained
                    .push_str(&format!("{selector} {{{block}}}\n"));
            }
        }
    }

    stylesheet
        .rules
        .sort_by_key(|rule| (rule.specificity, rule.order));
    stylesheet
}

fn strip_comments(css: &str) -> String {
    let mut out = String::with_capacity(css.len());
    let mut rest = css;
    while let Some(start) = rest.find("/*") {
        out.push_str(&rest[..start]);
        match rest[start + 2..].find("*/") {
            Some(end) => rest = &rest[start + 2 + end + 2..],
            None => return out,
        }
    }
    out.push_str(rest);
    out
}

/// Offset of the brace closing the block that opens at offset zero.
fn matching_brace(block: &str) -> Option<usize> {
    let mut depth = 0usize;
    for (idx, ch) in block.char_indices() {
        match ch {
            '{' => depth += 1,
            '}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(idx);
                }
            }
            _ => {}
        }
    }
    None
}

fn parse_declarations(block: &str) -> Vec<Declaration> {
    let mut declarations: Vec<Declaration> = Vec::new();
    for raw in block.split(';') {
        let Some((property, value)) = raw.split_once(':') else {
            continue;
        };
        let property = property.trim().to_ascii_lowercase();
        let value = value.trim();
        if property.is_empty() || value.is_empty() {
            continue;
        }
        let (value, important) = match strip_important(value) {
            Some(stripped) => (stripped, true),
            None => (value, false),
        };
        merge(
            &mut declarations,
            &Declaration {
                property,
                value: value.to_string(),
                important,
            },
        );
    }
    declarations
}

fn strip_important(value: &str) -> Option<&str> {
    const FLAG: &str = "!important";
    let idx = value.to_ascii_lowercase().rfind(FLAG)?;
    value[idx + FLAG.len()..]
        .trim()
        .is_empty()
        .then(|| value[..idx].trim_end())
}

fn merge(style: &mut Vec<Declaration>, incoming: &Declaration) {
    match style
        .iter_mut()
        .find(|existing| existing.property == incoming.property)
    {
        Some(existing) => {
            if incoming.important || !existing.important {
                *existing = incoming.clone();
            }
        }
        None => style.push(incoming.clone()),
    }
}

fn serialize(style: &[Declaration]) -> String {
    style
        .iter()
        .map(|declaration| {
            if declaration.important {
                format!("{}: {} !important", declaration.property, declaration.value)
            } else {
                format!("{}: {}", declaration.property, declaration.value)
            }
        })
        .collect::<Vec<_>>()
        .join("; ")
}

/// (ids, classes/attributes/pseudo-classes, type selectors)
fn specificity(selector: &str) -> (u32, u32, u32) {
    let (mut ids, mut classes, mut types) = (0, 0, 0);
    let mut word_start = true;
    for ch in selector.chars() {
        match ch {
            '#' => {
                ids += 1;
                word_start = false;
            }
            '.' | '[' | ':' => {
                classes += 1;
                word_start = false;
            }
            ' ' | '>' | '+' | '~' | '(' => word_start = true,
            ch if word_start && ch.is_ascii_alphabetic() => {
                types += 1;
                word_start = false;
            }
            _ => {}
        }
    }
    (ids, classes, types)
}
