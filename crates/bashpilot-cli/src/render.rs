use std::io::{self, Write};

use bashpilot::agent::AgentEvent;
use bashpilot::runner::CommandResult;
use bat::WrappingMode;
use cliclack::{spinner, ProgressBar};
use console::style;

const REASONING_PREVIEW: usize = 200;
const OUTPUT_PREVIEW: usize = 500;
const RULE_WIDTH: usize = 80;

/// Prints agent progress to the terminal
pub struct Renderer {
    quiet: bool,
    spinner: Option<ProgressBar>,
}

impl Renderer {
    pub fn new(quiet: bool) -> Self {
        Self {
            quiet,
            spinner: None,
        }
    }

    pub fn task_banner(&self, index: usize, total: usize, task: &str) {
        if self.quiet {
            return;
        }
        println!("{}", style("=".repeat(RULE_WIDTH)).dim());
        if total > 1 {
            println!("{} {}", style(format!("Task {}/{}:", index, total)).bold(), task);
        } else {
            println!("{} {}", style("Task:").bold(), task);
        }
        println!("{}", style("=".repeat(RULE_WIDTH)).dim());
    }

    pub fn render(&mut self, event: &AgentEvent) {
        self.hide_busy();
        match event {
            AgentEvent::IterationStarted {
                iteration,
                max_iterations,
            } => {
                if self.quiet {
                    return;
                }
                println!(
                    "\n{}",
                    style(format!("--- Iteration {}/{} ---", iteration, max_iterations)).dim()
                );
                self.show_busy("awaiting model");
            }
            AgentEvent::Reasoning(text) => {
                if !self.quiet {
                    println!(
                        "{} {}",
                        style("Analysis:").magenta(),
                        style(preview(text, REASONING_PREVIEW)).italic()
                    );
                    self.show_busy("awaiting model");
                }
            }
            AgentEvent::CommandStarted { command } => {
                if !self.quiet {
                    println!("{} {}", style("$").cyan().bold(), style(command).cyan());
                    self.show_busy("running command");
                }
            }
            AgentEvent::CommandFinished { result, .. } => {
                if !self.quiet {
                    print_result(result);
                }
            }
            AgentEvent::FinalAnswer(answer) => {
                if self.quiet {
                    println!("{}", answer);
                } else {
                    println!("\n{}", style("Answer:").green().bold());
                    print_markdown(answer);
                }
            }
            AgentEvent::Aborted(reason) => {
                eprintln!("{} {}", style("Aborted:").red().bold(), reason);
            }
        }
        if let Err(e) = io::stdout().flush() {
            tracing::debug!(error = %e, "stdout flush failed");
        }
    }

    /// Stop any spinner left running
    pub fn finish(&mut self) {
        self.hide_busy();
    }

    fn show_busy(&mut self, message: &str) {
        let spin = spinner();
        spin.start(message);
        self.spinner = Some(spin);
    }

    fn hide_busy(&mut self) {
        if let Some(spin) = self.spinner.take() {
            spin.stop("");
        }
    }
}

fn print_result(result: &CommandResult) {
    let exit = if result.success() {
        style(format!("exit {}", result.exit_code)).green()
    } else if result.timed_out {
        style(format!(
            "exit {} (timed out after {:.1}s)",
            result.exit_code,
            result.duration.as_secs_f64()
        ))
        .red()
    } else {
        style(format!("exit {}", result.exit_code)).red()
    };
    println!("{}", exit);
    if !result.output.is_empty() {
        println!("{}", preview(&result.output, OUTPUT_PREVIEW));
    }
}

fn print_markdown(content: &str) {
    let printed = bat::PrettyPrinter::new()
        .input(bat::Input::from_bytes(content.as_bytes()))
        .theme("zenburn")
        .language("Markdown")
        .wrapping_mode(WrappingMode::Character)
        .print();
    if let Err(e) = printed {
        tracing::debug!(error = %e, "markdown rendering failed");
        println!("{}", content);
    }
}

/// The first `max` characters, with `...` when anything was cut
pub fn preview(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let cut: String = text.chars().take(max).collect();
    format!("{}...", cut)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preview() {
        assert_eq!(preview("short", 10), "short");
        assert_eq!(preview("abcdef", 3), "abc...");
        assert_eq!(preview(&"x".repeat(200), 200), "x".repeat(200));
        // counts characters, not bytes
        assert_eq!(preview("ééé", 2), "éé...");
    }

    #[test]
    fn test_quiet_render_prints_without_spinner() {
        let mut renderer = Renderer::new(true);
        renderer.render(&AgentEvent::IterationStarted {
            iteration: 1,
            max_iterations: 5,
        });
        assert!(renderer.spinner.is_none());
        renderer.render(&AgentEvent::FinalAnswer("Done.".to_string()));
        renderer.finish();
        assert!(renderer.spinner.is_none());
    }
}
