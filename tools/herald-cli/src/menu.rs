//! Interactive menu.

use anyhow::Context;
use herald_core::{GroupId, Message};
use std::io::Write;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, Lines};
use tokio_util::sync::CancellationToken;

use crate::app::{App, SendOptions};

const MENU: &str = "\
a) fetch recipients from a group
b) run a delivery campaign
c) exit";

pub struct Menu<R, W> {
    input: Lines<R>,
    output: W,
}

impl<R, W> Menu<R, W>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    pub fn new(input: R, output: W) -> Self {
        Self {
            input: input.lines(),
            output,
        }
    }

    /// Show `text` and read one trimmed line. `None` at end of input.
    async fn prompt(&mut self, text: &str) -> anyhow::Result<Option<String>> {
        write!(self.output, "{text}")?;
        self.output.flush()?;
        let line = self.input.next_line().await.context("failed to read input")?;
        Ok(line.map(|line| line.trim().to_string()))
    }

    fn say(&mut self, text: impl AsRef<str>) -> anyhow::Result<()> {
        writeln!(self.output, "{}", text.as_ref())?;
        Ok(())
    }

    async fn read_group(&mut self) -> anyhow::Result<Option<GroupId>> {
        let Some(raw) = self.prompt("Group id: ").await? else {
            return Ok(None);
        };
        match raw.parse::<GroupId>() {
            Ok(group) => Ok(Some(group)),
            Err(e) => {
                self.say(format!("❌ {e}"))?;
                Ok(None)
            }
        }
    }

    /// Serve menu choices until exit or end of input. Failed actions are
    /// reported and the menu is shown again.
    pub async fn run(&mut self, app: &App, cancel: &CancellationToken) -> anyhow::Result<()> {
        loop {
            self.say(MENU)?;
            let Some(choice) = self.prompt("> ").await? else {
                break;
            };

            match choice.to_ascii_lowercase().as_str() {
                "a" => {
                    let Some(group) = self.read_group().await? else {
                        continue;
                    };
                    match app.fetch(group).await {
                        Ok(fetched) => self.say(format!(
                            "📥 Fetched {} recipients into {}",
                            fetched.len(),
                            app.recipients().path().display()
                        ))?,
                        Err(e) => self.say(format!("❌ {e:#}"))?,
                    }
                }
                "b" => {
                    let Some(source) = self
                        .prompt("Recipients from the stored list or a group? [s/g]: ")
                        .await?
                    else {
                        break;
                    };
                    let group = match source.to_ascii_lowercase().as_str() {
                        "s" => None,
                        "g" => match self.read_group().await? {
                            Some(group) => Some(group),
                            None => continue,
                        },
                        _ => {
                            self.say("❌ Expected 's' or 'g'")?;
                            continue;
                        }
                    };

                    let Some(content) = self.prompt("Message: ").await? else {
                        break;
                    };
                    if content.is_empty() {
                        self.say("❌ Message must not be empty")?;
                        continue;
                    }

                    let options = SendOptions {
                        group,
                        ..SendOptions::default()
                    };
                    match app
                        .send(Message::new(content), options, cancel.child_token())
                        .await
                    {
                        Ok(report) => self.say(format!(
                            "📊 Campaign {}: {} sent, {} failed. Report written to {}",
                            report.state,
                            report.sent,
                            report.failed,
                            app.report_path().display()
                        ))?,
                        Err(e) => self.say(format!("❌ {e:#}"))?,
                    }
                }
                "c" | "q" | "exit" => break,
                "" => {}
                other => self.say(format!("❌ Unknown choice {other:?}"))?,
            }
        }
        Ok(())
    }
}
