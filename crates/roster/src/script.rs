use anyhow::{anyhow, Result};
use clap::Parser;

use crate::Commands;

#[derive(Parser, Debug)]
#[command(no_binary_name = true)]
struct ScriptLine {
    #[command(subcommand)]
    command: Commands,
}

/// Numbered lines that carry a command; blanks and `#` comments are skipped.
pub fn lines(source: &str) -> impl Iterator<Item = (usize, &str)> {
    source
        .lines()
        .enumerate()
        .map(|(i, line)| (i + 1, line.trim()))
        .filter(|(_, line)| !line.is_empty() && !line.starts_with('#'))
}

pub fn parse_line(line: &str) -> Result<Commands> {
    let args = split_args(line)?;
    let parsed = ScriptLine::try_parse_from(args).map_err(|e| anyhow!("{}", e.render()))?;
    Ok(parsed.command)
}

/// Splits on whitespace, keeping double-quoted groups together.
pub fn split_args(line: &str) -> Result<Vec<String>> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut has_token = false;

    for c in line.chars() {
        match c {
            '"' => {
                in_quotes = !in_quotes;
                has_token = true;
            }
            c if c.is_whitespace() && !in_quotes => {
                if has_token {
                    args.push(std::mem::take(&mut current));
                    has_token = false;
                }
            }
            c => {
                current.push(c);
                has_token = true;
            }
        }
    }

    if in_quotes {
        return Err(anyhow!("unterminated quote in: {}", line));
    }
    if has_token {
        args.push(current);
    }
    Ok(args)
}

#[cfg(test)]
mod tests {
    use super::*;
    use roster_types::Role;

    #[test]
    fn test_split_args() {
        assert_eq!(
            split_args(r#"add-user "Alice Smith" alice@example.com admin"#).unwrap(),
            vec!["add-user", "Alice Smith", "alice@example.com", "admin"]
        );
        assert_eq!(split_args("  report  ").unwrap(), vec!["report"]);
        assert_eq!(split_args(r#"find-users --name """#).unwrap(), vec!["find-users", "--name", ""]);
        assert!(split_args(r#"add-user "Alice"#).is_err());
    }

    #[test]
    fn test_lines_skip_blanks_and_comments() {
        let source = "# seed\nadd-user A a@x.com\n\n  report\n";
        let found: Vec<(usize, &str)> = lines(source).collect();
        assert_eq!(found, vec![(2, "add-user A a@x.com"), (4, "report")]);
    }

    #[test]
    fn test_parse_add_user_line() {
        match parse_line(r#"add-user "Bob Johnson" bob@gmail.com"#).unwrap() {
            Commands::AddUser { name, email, role } => {
                assert_eq!(name, "Bob Johnson");
                assert_eq!(email, "bob@gmail.com");
                assert_eq!(role, None);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_parse_find_users_line() {
        match parse_line("find-users --id 2 --role moderator").unwrap() {
            Commands::FindUsers { id, role, name, email } => {
                assert_eq!(id, Some(2));
                assert_eq!(role, Some(Role::Moderator));
                assert_eq!(name, None);
                assert_eq!(email, None);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_parse_rejects_unknown_role_filter() {
        assert!(parse_line("find-users --role superadmin").is_err());
        assert!(parse_line("frobnicate").is_err());
    }
}
