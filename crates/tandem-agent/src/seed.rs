//! Opening context for a fresh conversation.
//!
//! Every history starts with one user turn describing the environment and a
//! fixed model acknowledgment, so the curated projection is well formed from
//! the first real exchange on.

use std::fs;
use std::path::Path;

use crate::config::ClientConfig;
use crate::history::ConversationTurn;

/// Model text that answers the environment turn.
pub const SEED_ACKNOWLEDGMENT: &str = "Got it. Thanks for the context!";

const MAX_LISTING_ENTRIES: usize = 200;

/// The two seed turns for `config`.
pub fn build_seed_turns(config: &ClientConfig) -> Vec<ConversationTurn> {
    vec![
        ConversationTurn::user(environment_text(config)),
        ConversationTurn::model(SEED_ACKNOWLEDGMENT),
    ]
}

fn environment_text(config: &ClientConfig) -> String {
    let today = chrono::Local::now().format("%A, %B %-d, %Y");
    let cwd = config.working_dir.display();

    let mut text = format!(
        "This is the setup context for our chat.\n\
         Today's date is {today}.\n\
         My operating system is: {os}\n\
         I'm currently working in the directory: {cwd}\n",
        os = std::env::consts::OS,
    );

    let listing = directory_listing(&config.working_dir, config.full_context);
    if listing.is_empty() {
        text.push_str("The directory is empty or could not be read.\n");
    } else {
        text.push_str("Here is the folder structure of the current working directory:\n\n");
        text.push_str(&listing);
    }

    let memory = config.user_memory.trim();
    if !memory.is_empty() {
        text.push_str("\nThings to remember about me:\n");
        text.push_str(memory);
        text.push('\n');
    }

    text
}

/// Sorted listing, directories suffixed with `/`.  Shallow and capped
/// unless `full` is set, in which case one more level is listed uncapped.
fn directory_listing(dir: &Path, full: bool) -> String {
    let mut lines = Vec::new();
    let limit = if full { usize::MAX } else { MAX_LISTING_ENTRIES };
    let total = list_into(dir, "", full, limit, &mut lines);

    if total > lines.len() {
        lines.push(format!("... ({} more entries not shown)", total - lines.len()));
    }
    lines.join("\n")
}

/// Append entries of `dir` to `lines`; returns how many entries exist at
/// this level.
fn list_into(
    dir: &Path,
    indent: &str,
    descend: bool,
    limit: usize,
    lines: &mut Vec<String>,
) -> usize {
    let Ok(read) = fs::read_dir(dir) else {
        return 0;
    };

    let mut entries: Vec<(String, bool)> = read
        .filter_map(|entry| entry.ok())
        .map(|entry| {
            let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);
            (entry.file_name().to_string_lossy().into_owned(), is_dir)
        })
        .collect();
    entries.sort();

    let total = entries.len();
    for (name, is_dir) in entries {
        if lines.len() >= limit {
            break;
        }
        if is_dir {
            lines.push(format!("{indent}{name}/"));
            if descend {
                list_into(&dir.join(&name), &format!("{indent}  "), false, limit, lines);
            }
        } else {
            lines.push(format!("{indent}{name}"));
        }
    }
    total
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;
    use crate::history::Role;

    fn config_for(dir: &Path) -> ClientConfig {
        ClientConfig {
            working_dir: dir.to_path_buf(),
            ..ClientConfig::default()
        }
    }

    #[test]
    fn seed_is_a_user_model_pair() {
        let tmp = TempDir::new().unwrap();
        let turns = build_seed_turns(&config_for(tmp.path()));
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0].role, Role::User);
        assert_eq!(turns[1].text(), SEED_ACKNOWLEDGMENT);
        assert!(turns.iter().all(ConversationTurn::is_valid));
    }

    #[test]
    fn environment_mentions_directory_listing_and_memory() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("b.txt"), "x").unwrap();
        fs::create_dir(tmp.path().join("a_dir")).unwrap();
        fs::write(tmp.path().join("a_dir/inner.rs"), "x").unwrap();

        let mut config = config_for(tmp.path());
        config.user_memory = "I prefer Go.".into();
        let text = build_seed_turns(&config)[0].text();

        assert!(text.contains(&tmp.path().display().to_string()));
        assert!(text.contains("a_dir/\nb.txt"));
        assert!(!text.contains("inner.rs"));
        assert!(text.contains("I prefer Go."));
        assert!(text.contains(std::env::consts::OS));
    }

    #[test]
    fn full_context_lists_one_level_deeper() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir(tmp.path().join("src")).unwrap();
        fs::write(tmp.path().join("src/main.go"), "x").unwrap();

        let mut config = config_for(tmp.path());
        config.full_context = true;
        let text = build_seed_turns(&config)[0].text();
        assert!(text.contains("src/\n  main.go"));
    }

    #[test]
    fn listing_is_capped() {
        let tmp = TempDir::new().unwrap();
        for i in 0..(MAX_LISTING_ENTRIES + 5) {
            fs::write(tmp.path().join(format!("f{i:04}.txt")), "").unwrap();
        }
        let listing = directory_listing(tmp.path(), false);
        assert_eq!(listing.lines().count(), MAX_LISTING_ENTRIES + 1);
        assert!(listing.ends_with("(5 more entries not shown)"));
    }

    #[test]
    fn unreadable_directory_is_reported() {
        let config = config_for(Path::new("/definitely/not/here"));
        let text = build_seed_turns(&config)[0].text();
        assert!(text.contains("could not be read"));
    }
}
