use std::fmt::Write;

use crate::invocation::Invocation;

/// Usage text of one command.
#[derive(Debug, Clone, Copy)]
pub struct CommandHelp<'a> {
    pub name: &'a str,
    pub summary: &'a str,
    pub usage: &'a str,
    pub options: &'a [(&'a str, &'a str)],
}

pub fn format_help(cmd: &CommandHelp<'_>) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{} - {}\n", cmd.name, cmd.summary);
    let _ = writeln!(out, "Usage: {}", cmd.usage);
    if !cmd.options.is_empty() {
        out.push_str("\nOptions:\n");
        for (opt, desc) in cmd.options {
            let _ = writeln!(out, "  {opt:16} {desc}");
        }
    }
    out
}

pub fn format_help_list(commands: &[CommandHelp<'_>]) -> String {
    let mut out = String::new();
    out.push_str("Available commands:\n\n");

    for cmd in commands {
        let _ = writeln!(out, "  {:12} {}", cmd.name, cmd.summary);
    }

    out.push_str("\nUse 'help COMMAND' or 'COMMAND --help' for more information.\n");
    out
}

/// `-h` or `--help` written on its own. A cluster such as `ls -lh` goes to
/// the command.
pub fn wants_help(invocation: &Invocation) -> bool {
    invocation.has_standalone_flag("h") || invocation.has_standalone_flag("help")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::invocation::ClassifierOptions;

    const POPD: CommandHelp<'static> = CommandHelp {
        name: "popd",
        summary: "Pop the directory stack",
        usage: "popd [-n]",
        options: &[("-n", "Do not change directory")],
    };

    #[test]
    fn help_includes_usage_and_options() {
        let text = format_help(&POPD);
        assert!(text.starts_with("popd - Pop the directory stack\n\n"));
        assert!(text.contains("Usage: popd [-n]\n"));
        assert!(text.contains("  -n               Do not change directory\n"));
    }

    #[test]
    fn help_list_has_one_line_per_command() {
        let text = format_help_list(&[POPD]);
        assert!(text.contains("  popd         Pop the directory stack\n"));
    }

    #[test]
    fn help_flags_are_detected() {
        let classify = |words: &[&str]| {
            Invocation::classify(
                words.iter().map(ToString::to_string).collect(),
                ClassifierOptions::default(),
            )
        };
        assert!(wants_help(&classify(&["cd", "-h"])));
        assert!(wants_help(&classify(&["cd", "--help"])));
        assert!(!wants_help(&classify(&["cd", "help"])));
        assert!(!wants_help(&classify(&["ls", "-lh"])));
        assert!(wants_help(&classify(&["ls", "-l", "-h"])));
    }
}
