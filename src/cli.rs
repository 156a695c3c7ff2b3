use std::future::Future;
use anyhow::Result;
use clap::{CommandFactory, Parser};
use tracing::debug;
use crate::service::credential::CredentialStore;

pub const MISSING_KEY_MESSAGE: &str = "Authentication key is required for filtering.";

#[derive(Parser, Debug)]
#[command(
    name = "proxyscout",
    version,
    about = "Collect Trojan and VMess proxies from public YAML files on GitHub",
    after_help = "Examples:\n  proxyscout -k foobar            Set GitHub authentication key to \"foobar\"\n  proxyscout -f 3 foo.bar.baz     Proxies for \"foo.bar.baz\" updated within the last 3 months\n  proxyscout foo.bar.baz          Same as above with the default window"
)]
pub struct Cli {
    /// Set GitHub authentication key
    #[arg(short, long, value_name = "STR")]
    pub key: Option<String>,

    /// Filter result by months
    #[arg(short, long, value_name = "NUM")]
    pub filter: Option<u32>,

    /// Domain to search proxy
    pub domain: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Help,
    SetKey(String),
    Search { domain: String, months: u32 },
}

impl Cli {
    /// `-k` 优先；没有域名时（包括只给了 `-f`）只打印帮助。
    pub fn into_command(self, default_months: u32) -> Command {
        if let Some(key) = self.key {
            return Command::SetKey(key);
        }
        match self.domain {
            Some(domain) if !domain.trim().is_empty() => Command::Search {
                domain,
                months: self.filter.unwrap_or(default_months),
            },
            _ => Command::Help,
        }
    }
}

pub fn print_help() -> Result<()> {
    Cli::command().print_help()?;
    println!();
    Ok(())
}

/// 执行命令。没有令牌时只在 stderr 提示，不发起任何请求。
pub async fn dispatch<F, Fut>(command: Command, credentials: &CredentialStore, run_search: F) -> Result<()>
where
    F: FnOnce(String, String, u32) -> Fut,
    Fut: Future<Output = Result<()>>,
{
    match command {
        Command::Help => print_help(),
        Command::SetKey(key) => credentials.store(&key),
        Command::Search { domain, months } => match credentials.load()? {
            Some(token) => {
                debug!("开始采集：domain={}, months={}", domain, months);
                run_search(token, domain, months).await
            }
            None => {
                eprintln!("{}", MISSING_KEY_MESSAGE);
                Ok(())
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn parse(args: &[&str]) -> Command {
        Cli::try_parse_from(args).unwrap().into_command(3)
    }

    #[test]
    fn test_cli_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_commands() {
        assert_eq!(parse(&["proxyscout"]), Command::Help);
        assert_eq!(parse(&["proxyscout", "-f", "6"]), Command::Help);
        assert_eq!(parse(&["proxyscout", "-k", "foobar"]), Command::SetKey("foobar".to_string()));
        assert_eq!(
            parse(&["proxyscout", "foo.bar.baz"]),
            Command::Search { domain: "foo.bar.baz".to_string(), months: 3 }
        );
        assert_eq!(
            parse(&["proxyscout", "--filter", "6", "foo.bar.baz"]),
            Command::Search { domain: "foo.bar.baz".to_string(), months: 6 }
        );
    }

    #[test]
    fn test_filter_must_be_a_number() {
        assert!(Cli::try_parse_from(["proxyscout", "-f", "abc", "foo.bar.baz"]).is_err());
    }

    #[tokio::test]
    async fn test_missing_key_makes_no_calls() {
        let dir = tempfile::tempdir().unwrap();
        let credentials = CredentialStore::new(dir.path().join("auth.txt"));
        let counter = AtomicUsize::new(0);
        let calls = &counter;

        let command = Command::Search { domain: "foo.bar.baz".to_string(), months: 3 };
        dispatch(command, &credentials, move |_, _, _| async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .await
        .unwrap();

        assert_eq!(counter.load(Ordering::SeqCst), 0);
        assert!(credentials.path().exists());
    }

    #[tokio::test]
    async fn test_set_key_then_search() {
        let dir = tempfile::tempdir().unwrap();
        let credentials = CredentialStore::new(dir.path().join("auth.txt"));

        dispatch(Command::SetKey("foobar".to_string()), &credentials, |_, _, _| async { Ok(()) })
            .await
            .unwrap();

        let mut seen = None;
        let command = Command::Search { domain: "foo.bar.baz".to_string(), months: 6 };
        dispatch(command, &credentials, |token, domain, months| {
            seen = Some((token, domain, months));
            async { Ok(()) }
        })
        .await
        .unwrap();

        assert_eq!(seen, Some(("foobar".to_string(), "foo.bar.baz".to_string(), 6)));
    }
}
