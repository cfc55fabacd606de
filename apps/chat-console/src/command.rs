use std::path::PathBuf;

use rooom_core::message::ActionKey;

#[derive(Debug, PartialEq, Eq)]
pub enum Command {
    Send(String),
    Action(ActionKey),
    Book(String),
    Pack(String),
    Attach(Vec<PathBuf>),
    Detach(usize),
    Open,
    Close,
    Minimize,
    Toggle,
    Sound(bool),
    Reset,
    Status,
    Help,
    Quit,
}

pub const HELP: &str = "\
commands:
  <text>                 send a message
  /action <booking|pricing|human>
  /book <slot-id>        book a slot from the last offer
  /pack <pack-id>        buy a pack from the last offer
  /attach <path>...      upload files
  /detach <n>            remove attachment n
  /open /close /min /toggle
  /sound <on|off>
  /reset /status /help /quit";

pub fn parse(line: &str) -> Result<Option<Command>, String> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let Some(rest) = line.strip_prefix('/') else {
        return Ok(Some(Command::Send(line.to_string())));
    };
    let mut parts = rest.split_whitespace();
    let name = parts.next().unwrap_or_default();
    let args: Vec<&str> = parts.collect();
    let one = |usage: &str| match args.as_slice() {
        [arg] => Ok(arg.to_string()),
        _ => Err(format!("usage: /{name} {usage}")),
    };

    let command = match name {
        "action" => {
            let raw = one("<booking|pricing|human>")?;
            Command::Action(ActionKey::parse(&raw).ok_or_else(|| format!("unknown action {raw}"))?)
        }
        "book" => Command::Book(one("<slot-id>")?),
        "pack" => Command::Pack(one("<pack-id>")?),
        "attach" if !args.is_empty() => {
            Command::Attach(args.iter().map(|a| PathBuf::from(*a)).collect())
        }
        "attach" => return Err("usage: /attach <path>...".into()),
        "detach" => {
            let raw = one("<n>")?;
            Command::Detach(raw.parse().map_err(|_| format!("not an index: {raw}"))?)
        }
        "open" => Command::Open,
        "close" => Command::Close,
        "min" | "minimize" => Command::Minimize,
        "toggle" => Command::Toggle,
        "sound" => match one("<on|off>")?.as_str() {
            "on" => Command::Sound(true),
            "off" => Command::Sound(false),
            other => return Err(format!("expected on or off, got {other}")),
        },
        "reset" => Command::Reset,
        "status" => Command::Status,
        "help" | "?" => Command::Help,
        "quit" | "exit" => Command::Quit,
        other => return Err(format!("unknown command /{other}")),
    };
    Ok(Some(command))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_is_sent() {
        assert_eq!(
            parse("  Bonjour  ").unwrap(),
            Some(Command::Send("Bonjour".into()))
        );
        assert_eq!(parse("   ").unwrap(), None);
    }

    #[test]
    fn slash_commands() {
        assert_eq!(
            parse("/action pricing").unwrap(),
            Some(Command::Action(ActionKey::Pricing))
        );
        assert_eq!(parse("/book slot-2").unwrap(), Some(Command::Book("slot-2".into())));
        assert_eq!(parse("/sound off").unwrap(), Some(Command::Sound(false)));
        assert_eq!(
            parse("/attach a.png b.pdf").unwrap(),
            Some(Command::Attach(vec!["a.png".into(), "b.pdf".into()]))
        );
        assert_eq!(parse("/min").unwrap(), Some(Command::Minimize));
    }

    #[test]
    fn bad_commands_report_usage() {
        assert!(parse("/book").is_err());
        assert!(parse("/action dance").is_err());
        assert!(parse("/detach x").is_err());
        assert!(parse("/frobnicate").is_err());
    }
}
