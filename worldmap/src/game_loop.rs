use crate::ai::prompts::map_tables;
use crate::io::{display, display_warning};
use crate::state::{GameState, TurnReport};
use anyhow::Result;
use reedline::{DefaultPrompt, Reedline, Signal};
use strum::{EnumString, EnumVariantNames, VariantNames};

/// Commands handled locally instead of being sent as narrative.
#[derive(Debug, Clone, Copy, PartialEq, EnumString, EnumVariantNames)]
#[strum(serialize_all = "lowercase")]
enum BuiltinCommand {
    Map,
    Help,
    Quit,
}

enum Input<'a> {
    Builtin(BuiltinCommand),
    Unknown(&'a str),
    Narrative(&'a str),
    Empty,
}

fn classify(line: &str) -> Input<'_> {
    let line = line.trim();
    match line.strip_prefix('/') {
        Some(cmd) => match cmd.parse::<BuiltinCommand>() {
            Ok(builtin) => Input::Builtin(builtin),
            Err(_) => Input::Unknown(cmd),
        },
        None if line.is_empty() => Input::Empty,
        None => Input::Narrative(line),
    }
}

pub struct GameLoop {
    state: GameState,
    editor: Reedline,
    prompt: DefaultPrompt,
}

impl GameLoop {
    pub fn new(state: GameState) -> GameLoop {
        GameLoop {
            state,
            editor: Reedline::create(),
            prompt: DefaultPrompt::default(),
        }
    }

    pub fn display_report(report: &TurnReport) {
        display!("\n{}\n", report);
        if let Some(warning) = &report.warning {
            display_warning(warning.to_string());
        }
    }

    async fn handle_narrative(&mut self, narrative: &str) {
        let report = self.state.run_turn(narrative).await;
        Self::display_report(&report);
    }

    /// Returns false when the loop should end.
    fn handle_builtin(&self, builtin: BuiltinCommand) -> bool {
        match builtin {
            BuiltinCommand::Map => display!(map_tables(&self.state.graph)),
            BuiltinCommand::Help => display!(
                "Type what happens next in the story. Commands: /{}",
                BuiltinCommand::VARIANTS.join(", /")
            ),
            BuiltinCommand::Quit => return false,
        };

        true
    }

    pub async fn run_loop(&mut self) -> Result<()> {
        loop {
            let sig = self.editor.read_line(&self.prompt);

            match sig {
                Ok(Signal::Success(buffer)) => match classify(&buffer) {
                    Input::Builtin(builtin) => {
                        if !self.handle_builtin(builtin) {
                            break;
                        }
                    }
                    Input::Unknown(cmd) => display!("Unknown command: /{}", cmd),
                    Input::Narrative(narrative) => self.handle_narrative(narrative).await,
                    Input::Empty => (),
                },
                Ok(Signal::CtrlD) | Ok(Signal::CtrlC) => {
                    display!("\nAborted!");
                    break;
                }
                Err(err) => return Err(err.into()),
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slash_lines_are_commands() {
        assert!(matches!(classify(" /map "), Input::Builtin(BuiltinCommand::Map)));
        assert!(matches!(classify("/QUIT"), Input::Unknown("QUIT")));
        assert!(matches!(classify("/dance"), Input::Unknown("dance")));
        assert!(matches!(classify("The gate opens."), Input::Narrative("The gate opens.")));
        assert!(matches!(classify("   "), Input::Empty));
    }
}
