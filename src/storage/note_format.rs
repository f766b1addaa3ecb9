//! Human-editable note file format.
//!
//! ```text
//! # <title>
//!
//! <content>
//! ---
//! tags: a, b
//! created: 2026-10-14T09:00:00.000Z
//! updated: 2026-10-14T09:00:00.000Z
//! deleted: false
//! ```
//!
//! The footer is required. The body runs up to the *last* separator line, so
//! content may itself contain `---` horizontal rules.

use crate::error::{Error, Result};
use crate::types::{parse_timestamp, Note};

const SEPARATOR: &str = "\n---\n";
const TAG_JOIN: &str = ", ";

/// Check the invariants `format`/`parse` rely on to round-trip.
pub fn validate_note(note: &Note) -> Result<()> {
    validate_title(&note.title)?;
    validate_tags(&note.tags)?;
    for (name, value) in [("created", &note.created_at), ("updated", &note.updated_at)] {
        if parse_timestamp(value).is_none() {
            return Err(Error::Validation(format!(
                "{name} timestamp is not RFC 3339: {value}"
            )));
        }
    }
    Ok(())
}

pub fn validate_title(title: &str) -> Result<()> {
    if title.trim().is_empty() {
        return Err(Error::Validation("title must not be empty".into()));
    }
    if title.contains('\n') || title.contains('\r') {
        return Err(Error::Validation("title must be a single line".into()));
    }
    if title != title.trim() {
        return Err(Error::Validation(
            "title must not have leading or trailing whitespace".into(),
        ));
    }
    Ok(())
}

pub fn validate_tags(tags: &[String]) -> Result<()> {
    for tag in tags {
        if tag.is_empty() || tag != tag.trim() {
            return Err(Error::Validation(format!(
                "tag must be non-empty without surrounding whitespace: {tag:?}"
            )));
        }
        if tag.contains(',') || tag.contains('\n') {
            return Err(Error::Validation(format!(
                "tag must not contain commas or newlines: {tag:?}"
            )));
        }
    }
    Ok(())
}

/// Render a note to its on-disk text.
pub fn format(note: &Note) -> String {
    format!(
        "# {title}\n\n{content}{SEPARATOR}tags: {tags}\ncreated: {created}\nupdated: {updated}\ndeleted: {deleted}\n",
        title = note.title,
        content = note.content,
        tags = note.tags.join(TAG_JOIN),
        created = note.created_at,
        updated = note.updated_at,
        deleted = note.deleted,
    )
}

/// Parse on-disk text back into a note. The id comes from the file name.
pub fn parse(id: &str, text: &str) -> Result<Note> {
    let malformed = |why: &str| Error::Validation(format!("malformed note {id}: {why}"));

    let rest = text
        .strip_prefix("# ")
        .ok_or_else(|| malformed("missing title heading"))?;
    let (title, rest) = rest
        .split_once("\n\n")
        .ok_or_else(|| malformed("missing blank line after title"))?;

    // Prepend the newline consumed by the heading split so an empty body still
    // leaves the separator intact.
    let body_and_footer = format!("\n{rest}");
    let split_at = body_and_footer
        .rfind(SEPARATOR)
        .ok_or_else(|| malformed("missing footer"))?;
    let content = body_and_footer.get(1..split_at).unwrap_or("");
    let footer = &body_and_footer[split_at + SEPARATOR.len()..];

    let mut tags = None;
    let mut created = None;
    let mut updated = None;
    let mut deleted = None;

    for line in footer.lines().filter(|l| !l.trim().is_empty()) {
        let (key, value) = line
            .split_once(':')
            .ok_or_else(|| malformed(&format!("footer line is not key: value: {line}")))?;
        let value = value.strip_prefix(' ').unwrap_or(value);
        match key.trim() {
            "tags" => {
                tags = Some(if value.is_empty() {
                    Vec::new()
                } else {
                    value.split(TAG_JOIN).map(str::to_string).collect()
                })
            }
            "created" => created = Some(value.to_string()),
            "updated" => updated = Some(value.to_string()),
            "deleted" => {
                deleted = Some(match value {
                    "true" => true,
                    "false" => false,
                    other => return Err(malformed(&format!("deleted is not a boolean: {other}"))),
                })
            }
            other => return Err(malformed(&format!("unknown footer key: {other}"))),
        }
    }

    let note = Note {
        id: id.to_string(),
        title: title.to_string(),
        content: content.to_string(),
        tags: tags.ok_or_else(|| malformed("footer missing tags"))?,
        created_at: created.ok_or_else(|| malformed("footer missing created"))?,
        updated_at: updated.ok_or_else(|| malformed("footer missing updated"))?,
        deleted: deleted.ok_or_else(|| malformed("footer missing deleted"))?,
    };
    validate_note(&note)?;
    Ok(note)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn note(content: &str, tags: &[&str]) -> Note {
        Note {
            id: "mem_0a1b2c3d".into(),
            title: "Deploy checklist".into(),
            content: content.into(),
            tags: tags.iter().map(|t| t.to_string()).collect(),
            created_at: "2026-10-14T09:00:00.000Z".into(),
            updated_at: "2026-10-14T09:30:00.000Z".into(),
            deleted: false,
        }
    }

    #[test]
    fn format_layout() {
        let text = format(&note("Run the tests.", &["ops", "deploy"]));
        assert_eq!(
            text,
            "# Deploy checklist\n\nRun the tests.\n---\ntags: ops, deploy\n\
             created: 2026-10-14T09:00:00.000Z\nupdated: 2026-10-14T09:30:00.000Z\ndeleted: false\n"
        );
    }

    #[test]
    fn round_trips_varied_notes() {
        let cases = [
            note("Run the tests.", &["ops", "deploy"]),
            note("", &[]),
            note("line one\n\nline three\n", &["x"]),
            note("above\n---\nbelow a horizontal rule", &["md"]),
            note("ends with separator-like text\n---", &[]),
            note("# not a heading inside body\ntags: fake", &["a b"]),
            note("unicode — ünïcödé ✓", &["日本語"]),
        ];
        for original in cases {
            let mut deleted = original.clone();
            deleted.deleted = true;
            for n in [original, deleted] {
                let parsed = parse(&n.id, &format(&n)).unwrap();
                assert_eq!(parsed, n);
            }
        }
    }

    #[test]
    fn missing_footer_is_malformed() {
        let err = parse("mem_x", "# Title\n\nJust a body\n").unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert!(err.to_string().contains("missing footer"));
    }

    #[test]
    fn missing_footer_key_is_malformed() {
        let text = "# Title\n\nBody\n---\ntags: a\ncreated: 2026-10-14T09:00:00.000Z\ndeleted: false\n";
        let err = parse("mem_x", text).unwrap_err();
        assert!(err.to_string().contains("missing updated"));
    }

    #[test]
    fn missing_heading_is_malformed() {
        let text = "Title\n\nBody\n---\ntags: \ncreated: x\nupdated: x\ndeleted: false\n";
        assert!(parse("mem_x", text).is_err());
    }

    #[test]
    fn bad_deleted_flag_is_malformed() {
        let text = "# T\n\nB\n---\ntags: \ncreated: 2026-10-14T09:00:00.000Z\n\
                    updated: 2026-10-14T09:00:00.000Z\ndeleted: maybe\n";
        assert!(parse("mem_x", text).is_err());
    }

    #[test]
    fn tags_with_commas_are_invalid() {
        assert!(validate_tags(&["a,b".to_string()]).is_err());
        assert!(validate_tags(&[" padded".to_string()]).is_err());
        assert!(validate_tags(&["fine".to_string(), "also fine".to_string()]).is_ok());
    }
}
