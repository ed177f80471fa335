//! Terminal rendering of snapshots
//!
//! Snapshots are complete states; the printers here remember what was
//! already written and only emit the difference, so a reply streams to
//! stdout token by token while tool activity goes to stderr.

use std::collections::HashMap;
use std::io::{self, Write};

use assistant_core::api::{ConversationList, ReferenceBook};
use assistant_core::{
    ChatSnapshot, ConversationTurn, ParseSnapshot, ToolInvocation, ToolStatus,
    TransactionProposal, TransactionType, TurnRole,
};

/// Streams a chat reply from successive snapshots
#[derive(Debug, Default)]
pub struct ChatPrinter {
    /// Turns already accounted for
    seen_turns: usize,
    /// Part of the current reply already written
    printed: String,
    /// Last status printed per tool
    tools: HashMap<String, ToolStatus>,
    error_shown: bool,
}

impl ChatPrinter {
    /// Start after the turns already in `snapshot`
    pub fn after(snapshot: &ChatSnapshot) -> Self {
        Self {
            seen_turns: snapshot.transcript.len(),
            ..Self::default()
        }
    }

    /// Write whatever changed since the last call
    pub fn update(&mut self, snapshot: &ChatSnapshot) -> io::Result<()> {
        let mut out = io::stdout().lock();

        for tool in &snapshot.tools {
            self.tool_line(tool)?;
        }

        for turn in snapshot.transcript.iter().skip(self.seen_turns) {
            if turn.role == TurnRole::Assistant {
                for tool in &turn.tool_invocations {
                    self.tool_line(tool)?;
                }
                write_delta(&mut out, &self.printed, &turn.content)?;
                writeln!(out)?;
                self.printed.clear();
                self.tools.clear();
            }
        }
        self.seen_turns = snapshot.transcript.len();

        if !snapshot.in_progress.is_empty() {
            write_delta(&mut out, &self.printed, &snapshot.in_progress)?;
            self.printed.clone_from(&snapshot.in_progress);
        }
        out.flush()?;

        if let Some(error) = &snapshot.error {
            if !self.error_shown {
                self.error_shown = true;
                let hint = if error.recoverable { " (try again)" } else { "" };
                eprintln!("\nerror: {}{hint}", error.message);
            }
        }
        Ok(())
    }

    fn tool_line(&mut self, tool: &ToolInvocation) -> io::Result<()> {
        if self.tools.get(&tool.tool_name) == Some(&tool.status) {
            return Ok(());
        }
        self.tools.insert(tool.tool_name.clone(), tool.status);

        let mut err = io::stderr().lock();
        match tool.status {
            ToolStatus::Running => writeln!(err, "  ... {}", tool.tool_name),
            ToolStatus::Success => writeln!(err, "  ok  {}", tool.tool_name),
            ToolStatus::Error => writeln!(
                err,
                "  err {}: {}",
                tool.tool_name,
                tool.error.as_deref().unwrap_or("failed")
            ),
        }
    }
}

fn write_delta(out: &mut impl Write, printed: &str, full: &str) -> io::Result<()> {
    match full.strip_prefix(printed) {
        Some(rest) => write!(out, "{rest}"),
        None => write!(out, "\n{full}"),
    }
}

/// Prints proposals as they become visible
#[derive(Debug)]
pub struct ParsePrinter<'a> {
    shown: usize,
    references: &'a ReferenceBook,
    finished: bool,
}

impl<'a> ParsePrinter<'a> {
    /// Resolve category and tag names through `references`
    pub fn new(references: &'a ReferenceBook) -> Self {
        Self {
            shown: 0,
            references,
            finished: false,
        }
    }

    /// Write newly revealed proposals and the final summary
    pub fn update(&mut self, snapshot: &ParseSnapshot) -> io::Result<()> {
        let mut out = io::stdout().lock();
        for (index, proposal) in snapshot.visible.iter().enumerate().skip(self.shown) {
            writeln!(out, "[{index}] {}", proposal_line(proposal, self.references))?;
        }
        self.shown = snapshot.visible.len();

        if snapshot.done && !self.finished {
            self.finished = true;
            writeln!(
                out,
                "{} proposal(s), {} selected",
                snapshot.visible.len(),
                snapshot.selected.len()
            )?;
        }
        out.flush()?;

        if let Some(error) = &snapshot.error {
            if !self.finished {
                self.finished = true;
                eprintln!("error: {}", error.message);
            }
        }
        Ok(())
    }
}

/// One proposal as a single line
pub fn proposal_line(proposal: &TransactionProposal, references: &ReferenceBook) -> String {
    let sign = match proposal.kind {
        TransactionType::Expense => "-",
        TransactionType::Income => "+",
    };
    let mut line = format!(
        "{}  {sign}{:.2}  {}  [{}]",
        proposal.date,
        proposal.amount.abs(),
        proposal.description,
        references.category_label(proposal.category_id)
    );
    let tags = references.tag_labels(&proposal.tags);
    if !tags.is_empty() {
        line.push_str("  #");
        line.push_str(&tags.join(" #"));
    }
    line
}

/// Print stored turns
pub fn print_transcript(turns: &[ConversationTurn]) -> io::Result<()> {
    let mut out = io::stdout().lock();
    for turn in turns {
        let who = match turn.role {
            TurnRole::User => "you",
            TurnRole::Assistant => "mai",
        };
        writeln!(out, "{} {who}> {}", turn.timestamp.format("%Y-%m-%d %H:%M"), turn.content)?;
    }
    Ok(())
}

/// Print the conversation index
pub fn print_conversations(list: &ConversationList) -> io::Result<()> {
    let mut out = io::stdout().lock();
    for conversation in &list.conversations {
        let title = if conversation.title.is_empty() {
            "(untitled)"
        } else {
            conversation.title.as_str()
        };
        writeln!(
            out,
            "{:>6}  {}  {title}",
            conversation.id,
            conversation.updated_at.format("%Y-%m-%d %H:%M"),
        )?;
    }
    writeln!(out, "{} conversation(s)", list.total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assistant_core::api::{Category, Tag};
    use chrono::NaiveDate;

    fn references() -> ReferenceBook {
        ReferenceBook::new(
            vec![Category {
                id: 3,
                name: "Food".to_string(),
                icon: None,
                color: None,
            }],
            vec![Tag {
                id: 2,
                name: "work".to_string(),
                color: None,
            }],
        )
    }

    #[test]
    fn test_proposal_line() {
        let proposal = TransactionProposal {
            amount: 12.5,
            kind: TransactionType::Expense,
            description: "Lunch".to_string(),
            date: NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
            category_id: 3,
            tags: vec![2],
        };
        assert_eq!(
            proposal_line(&proposal, &references()),
            "2024-06-01  -12.50  Lunch  [Food]  #work"
        );
    }

    #[test]
    fn test_delta_appends_suffix() {
        let mut out = Vec::new();
        write_delta(&mut out, "Hel", "Hello").unwrap();
        assert_eq!(out, b"lo");
    }

    #[test]
    fn test_delta_rewrites_on_divergence() {
        let mut out = Vec::new();
        write_delta(&mut out, "abc", "xyz").unwrap();
        assert_eq!(out, b"\nxyz");
    }
}
