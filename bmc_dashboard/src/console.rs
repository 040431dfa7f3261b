//! Line commands accepted by the terminal dashboard.

use bmc_protocol::DUTY_CYCLE_MAX;

pub const HELP: &str = "commands: power [on|off] | fan <n> <duty> | fans <duty> | refresh on|off | info | connect | disconnect | quit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    /// `None` toggles.
    Power(Option<bool>),
    /// Zero-based fan id.
    Fan { fan_id: u32, duty_cycle: u8 },
    AllFans { duty_cycle: u8 },
    AutoRefresh(bool),
    Info,
    Connect,
    Disconnect,
    Quit,
}

/// Parses one input line. Blank lines are `Ok(None)`; fan numbers are 1-based.
pub fn parse(line: &str) -> Result<Option<ConsoleCommand>, String> {
    let words: Vec<&str> = line.split_whitespace().collect();
    let Some((&head, rest)) = words.split_first() else {
        return Ok(None);
    };

    let cmd = match (head.to_ascii_lowercase().as_str(), rest) {
        ("power", []) => ConsoleCommand::Power(None),
        ("power", [state]) => ConsoleCommand::Power(Some(on_off(state)?)),
        ("fan", [n, duty]) => {
            let n: u32 = n.parse().map_err(|_| format!("bad fan number: {n}"))?;
            if n == 0 {
                return Err("fans are numbered from 1".to_string());
            }
            ConsoleCommand::Fan {
                fan_id: n - 1,
                duty_cycle: duty_cycle(duty)?,
            }
        }
        ("fans", [duty]) => ConsoleCommand::AllFans {
            duty_cycle: duty_cycle(duty)?,
        },
        ("refresh", [state]) => ConsoleCommand::AutoRefresh(on_off(state)?),
        ("info", []) => ConsoleCommand::Info,
        ("connect", []) => ConsoleCommand::Connect,
        ("disconnect", []) => ConsoleCommand::Disconnect,
        ("quit" | "exit", []) => ConsoleCommand::Quit,
        _ => return Err(format!("unrecognized: {}", line.trim())),
    };
    Ok(Some(cmd))
}

fn on_off(word: &str) -> Result<bool, String> {
    match word.to_ascii_lowercase().as_str() {
        "on" => Ok(true),
        "off" => Ok(false),
        other => Err(format!("expected on or off, got {other}")),
    }
}

fn duty_cycle(word: &str) -> Result<u8, String> {
    let duty: u8 = word
        .trim_end_matches('%')
        .parse()
        .map_err(|_| format!("bad duty cycle: {word}"))?;
    if duty > DUTY_CYCLE_MAX {
        return Err(format!("duty cycle must be 0..={DUTY_CYCLE_MAX}"));
    }
    Ok(duty)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_fan_commands_with_one_based_numbers() {
        assert_eq!(
            parse("fan 1 40").unwrap(),
            Some(ConsoleCommand::Fan {
                fan_id: 0,
                duty_cycle: 40
            })
        );
        assert_eq!(
            parse("  fans 75% ").unwrap(),
            Some(ConsoleCommand::AllFans { duty_cycle: 75 })
        );
        assert!(parse("fan 0 40").is_err());
        assert!(parse("fan 2 140").is_err());
    }

    #[test]
    fn parses_switches() {
        assert_eq!(parse("power").unwrap(), Some(ConsoleCommand::Power(None)));
        assert_eq!(parse("POWER on").unwrap(), Some(ConsoleCommand::Power(Some(true))));
        assert_eq!(parse("refresh off").unwrap(), Some(ConsoleCommand::AutoRefresh(false)));
        assert!(parse("refresh maybe").is_err());
    }

    #[test]
    fn blank_and_unknown_lines() {
        assert_eq!(parse("   ").unwrap(), None);
        assert!(parse("reboot now").is_err());
        assert_eq!(parse("quit").unwrap(), Some(ConsoleCommand::Quit));
    }
}
