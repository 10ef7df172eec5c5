use crate::shell::command::Command;

pub fn parse_command(input: &str) -> Option<Command> {
    let tokens: Vec<&str> = input.trim().split_ascii_whitespace().collect();
    if tokens.is_empty() {
        return None;
    }

    let cmd = tokens[0];
    let args = &tokens[1..];

    // 第 n 个参数解析成数字
    fn num<T: std::str::FromStr>(args: &[&str], n: usize) -> Option<T> {
        let raw = *args.get(n)?;
        T::from_str(raw).ok()
    }

    match cmd {
        "help" => Some(Command::Help),
        "drives" => Some(Command::Drives),
        "format" => {
            let drive = num(args, 0)?;
            let mut verify = true;
            let mut assume_yes = false;
            for flag in &args[1..] {
                match *flag {
                    "--no-verify" => verify = false,
                    "-y" | "--yes" => assume_yes = true,
                    _ => return None,
                }
            }
            Some(Command::Format {
                drive,
                verify,
                assume_yes,
            })
        }
        "mount" => num(args, 0).map(Command::Mount),
        "bitmap" => num(args, 0).map(Command::Bitmap),
        "create" => num(args, 0).map(Command::Create),
        "rm" => Some(Command::Rm(num(args, 0)?, num(args, 1)?)),
        "stat" => Some(Command::Stat(num(args, 0)?, num(args, 1)?)),
        "ls" => num(args, 0).map(Command::Ls),
        "check" => num(args, 0).map(Command::Check),
        "scan" => num(args, 0).map(Command::Scan),
        "dump" => Some(Command::Dump(num(args, 0)?, parse_lba(args.get(1)?)?)),
        "exit" => Some(Command::Exit),
        _ => None,
    }
}

/// 十进制或 0x 前缀的十六进制
fn parse_lba(raw: &str) -> Option<u32> {
    match raw.strip_prefix("0x").or_else(|| raw.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16).ok(),
        None => raw.parse().ok(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drive_commands() {
        assert_eq!(parse_command("mount 0"), Some(Command::Mount(0)));
        assert_eq!(parse_command("  ls   2 "), Some(Command::Ls(2)));
        assert_eq!(parse_command("stat 1 17"), Some(Command::Stat(1, 17)));
        assert_eq!(parse_command("rm 0 3"), Some(Command::Rm(0, 3)));
        assert_eq!(parse_command("dump 0 0x1f"), Some(Command::Dump(0, 31)));
        assert_eq!(parse_command("dump 0 131"), Some(Command::Dump(0, 131)));
    }

    #[test]
    fn format_flags() {
        assert_eq!(
            parse_command("format 1"),
            Some(Command::Format {
                drive: 1,
                verify: true,
                assume_yes: false
            })
        );
        assert_eq!(
            parse_command("format 0 --no-verify -y"),
            Some(Command::Format {
                drive: 0,
                verify: false,
                assume_yes: true
            })
        );
        assert_eq!(parse_command("format 0 --force"), None);
    }

    #[test]
    fn missing_or_bad_arguments() {
        assert_eq!(parse_command(""), None);
        assert_eq!(parse_command("mount"), None);
        assert_eq!(parse_command("mount x"), None);
        assert_eq!(parse_command("mount 300"), None);
        assert_eq!(parse_command("stat 0"), None);
        assert_eq!(parse_command("dump 0 0xZZ"), None);
        assert_eq!(parse_command("mkdir a"), None);
    }
}
