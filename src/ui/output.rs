//! Plain-text printing of the feed.
//!
//! Everything taken from store documents is passed through
//! [`sanitize_line`] before it is written.

use std::io::{self, Write};

use blogfeed::feed::{ConfirmAction, FeedController, FeedMode, FeedStatus, NotificationLevel};
use blogfeed::util::sanitize_line;

/// Columns available for an item title
const TITLE_WIDTH: usize = 56;
/// Columns available for ids, tags and category names
const LABEL_WIDTH: usize = 24;

const HELP_TEXT: &str = "\
Commands:
  list               show loaded items
  more               load the next page
  type <text>        set the search input (empty text clears it)
  clear              clear the search input and reload the first page
  search [term]      search titles and tags (defaults to the current input)
  delete <id>        delete an item (asks for confirmation)
  tags               all tags in the collection
  categories         item counts per category
  active <name>      switch the active view and reload
  reset              reload from the first page
  help               this text
  quit               exit";

/// Header line plus the visible items.
pub(super) fn items<W: Write>(out: &mut W, controller: &FeedController) -> io::Result<()> {
    writeln!(out, "{}", header(controller))?;

    if let Some(term) = controller.no_results() {
        writeln!(out, "  No results for \"{}\"", sanitize_line(term, TITLE_WIDTH))?;
        return Ok(());
    }
    if controller.items().is_empty() {
        if controller.is_loading() {
            writeln!(out, "  Loading...")?;
        } else {
            writeln!(out, "  (no items)")?;
        }
        return Ok(());
    }

    for (index, item) in controller.items().iter().enumerate() {
        let mut line = format!(
            "{:>3}. {:<title_width$}  [{}]",
            index + 1,
            sanitize_line(&item.title, TITLE_WIDTH),
            sanitize_line(item.category.label(), LABEL_WIDTH),
            title_width = TITLE_WIDTH,
        );
        if !item.tags.is_empty() {
            let tags: Vec<String> = item
                .tags
                .iter()
                .map(|t| sanitize_line(t, LABEL_WIDTH))
                .collect();
            line.push_str(&format!(" #{}", tags.join(" #")));
        }
        writeln!(out, "{}", line)?;
        writeln!(out, "     id: {}", sanitize_line(&item.id, LABEL_WIDTH))?;
    }

    if controller.has_more() && controller.status() == FeedStatus::Browsing {
        writeln!(out, "  (type 'more' for the next page)")?;
    }
    Ok(())
}

fn header(controller: &FeedController) -> String {
    let view = match controller.active() {
        Some(active) => format!(" [{}]", sanitize_line(active, LABEL_WIDTH)),
        None => String::new(),
    };
    let mode = match controller.mode() {
        FeedMode::Browsing => format!("Browsing, {} loaded", controller.items().len()),
        FeedMode::Searching { term } => format!(
            "Search \"{}\", {} results",
            sanitize_line(term, LABEL_WIDTH),
            controller.items().len()
        ),
    };
    let status = match controller.status() {
        FeedStatus::Loading => " (loading)",
        FeedStatus::Deleting => " (deleting)",
        FeedStatus::Exhausted => " (end of feed)",
        FeedStatus::Browsing | FeedStatus::Searching if controller.is_loading() => " (loading)",
        FeedStatus::Browsing | FeedStatus::Searching => "",
    };
    format!("== {}{}{}", mode, status, view)
}

pub(super) fn tags<W: Write>(out: &mut W, controller: &FeedController) -> io::Result<()> {
    if controller.tags().is_empty() {
        return writeln!(out, "No tags yet");
    }
    let tags: Vec<String> = controller
        .tags()
        .iter()
        .map(|t| format!("#{}", sanitize_line(t, LABEL_WIDTH)))
        .collect();
    writeln!(out, "{}", tags.join(" "))
}

pub(super) fn categories<W: Write>(out: &mut W, controller: &FeedController) -> io::Result<()> {
    if controller.category_counts().is_empty() {
        return writeln!(out, "No categories yet");
    }
    for entry in controller.category_counts() {
        let label = match entry.category.label() {
            "" => "\"\"".to_string(),
            label => sanitize_line(label, LABEL_WIDTH),
        };
        writeln!(
            out,
            "  {:<width$} {:>5}",
            label,
            entry.count,
            width = LABEL_WIDTH
        )?;
    }
    Ok(())
}

pub(super) fn notification<W: Write>(out: &mut W, controller: &FeedController) -> io::Result<()> {
    if let Some(notification) = controller.notification() {
        let level = match notification.level {
            NotificationLevel::Info => "info",
            NotificationLevel::Success => "ok",
            NotificationLevel::Error => "error",
        };
        writeln!(out, "[{}] {}", level, sanitize_line(&notification.message, 120))?;
    }
    Ok(())
}

pub(super) fn confirm_prompt<W: Write>(out: &mut W, controller: &FeedController) -> io::Result<()> {
    if let Some(ConfirmAction::DeleteItem { id, title }) = controller.pending_confirm() {
        let name = match title {
            Some(title) => format!("\"{}\"", sanitize_line(title, TITLE_WIDTH)),
            None => format!("item {}", sanitize_line(id, LABEL_WIDTH)),
        };
        write!(out, "Delete {}? [y/N] ", name)?;
        out.flush()?;
    }
    Ok(())
}

pub(super) fn help<W: Write>(out: &mut W) -> io::Result<()> {
    writeln!(out, "{}", HELP_TEXT)
}

/// Why `more` did nothing
pub(super) fn more_unavailable_reason(controller: &FeedController) -> &'static str {
    if matches!(controller.mode(), FeedMode::Searching { .. }) {
        return "Paging is off while searching; 'clear' to go back";
    }
    match controller.status() {
        FeedStatus::Exhausted => "No more items to display",
        FeedStatus::Deleting => "Wait for the delete to finish",
        _ => "Still loading",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use blogfeed::feed::{FeedOptions, UNCATEGORIZED_LABEL};
    use blogfeed::storage::SqliteStore;
    use serde_json::json;
    use std::sync::Arc;

    async fn mounted_with_categories(categories: &[Option<&str>]) -> FeedController {
        let store = SqliteStore::open(":memory:").await.unwrap();
        for (i, category) in categories.iter().enumerate() {
            let fields = json!({ "title": format!("Post {i}"), "category": category });
            store
                .put_document("blogs", &format!("{i}"), fields.as_object().cloned().unwrap())
                .await
                .unwrap();
        }
        let mut controller = FeedController::mount(Arc::new(store), FeedOptions::default()).await;
        while controller.aggregates().item_count() != categories.len() {
            let event = controller.next_event().await.unwrap();
            controller.handle_event(event);
        }
        controller.settle().await;
        controller
    }

    #[tokio::test]
    async fn test_categories_print_blank_name_distinctly() {
        let controller = mounted_with_categories(&[Some("Tech"), Some(""), None]).await;
        let mut out = Vec::new();
        categories(&mut out, &controller).unwrap();
        let text = String::from_utf8(out).unwrap();

        let lines: Vec<&str> = text.lines().map(str::trim).collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("Tech"));
        assert!(lines[1].starts_with("\"\""));
        assert!(lines[2].starts_with(UNCATEGORIZED_LABEL));
    }

    #[test]
    fn test_help_lists_every_command() {
        let mut out = Vec::new();
        help(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        for command in [
            "list", "more", "type", "clear", "search", "delete", "tags", "categories", "active",
            "reset", "help", "quit",
        ] {
            assert!(text.contains(command), "help is missing '{}'", command);
        }
    }
}
