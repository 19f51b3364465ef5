use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::sync::Arc;

use anyhow::{bail, Context, Result};

use crate::animation::{ManualFrames, Scheduler};
use crate::clock::{Clock, SystemClock};
use crate::codec;
use crate::config::{self, Config};
use crate::prefs::PreferenceManager;
use crate::session::{self, SessionContext, ThreadSession};
use crate::snapshot::ThreadSnapshot;
use crate::storage::{self, SqliteArea};
use crate::store::Store;

pub const USAGE: &str = "usage: readmark <command>

  status <post-id>                 Show the stored read state of a post
  process <snapshot> [--read-all]  List new and ignored comments of a thread snapshot
  summary <post-id> <total>        Print the post list label for a post
  ignore <user>                    Add a user to the ignore list
  unignore <user>                  Remove a user from the ignore list
  ignored                          List ignored users
  history <days>                   Keep read history for this many days
  clear                            Forget the read history of every post";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Status { post_id: String },
    Process { snapshot: PathBuf, read_all: bool },
    Summary { post_id: String, total: usize },
    Ignore { user: String },
    Unignore { user: String },
    Ignored,
    History { days: u32 },
    Clear,
}

impl Command {
    pub fn parse(args: &[String]) -> Result<Self> {
        let mut args = args.iter().map(String::as_str);
        let Some(name) = args.next() else {
            bail!("missing command\n\n{USAGE}");
        };
        let rest: Vec<&str> = args.collect();

        let command = match (name, rest.as_slice()) {
            ("status", [post_id]) => Command::Status {
                post_id: post_id.to_string(),
            },
            ("process", [snapshot]) => Command::Process {
                snapshot: PathBuf::from(snapshot),
                read_all: false,
            },
            ("process", [snapshot, "--read-all"]) | ("process", ["--read-all", snapshot]) => {
                Command::Process {
                    snapshot: PathBuf::from(snapshot),
                    read_all: true,
                }
            }
            ("summary", [post_id, total]) => Command::Summary {
                post_id: post_id.to_string(),
                total: total
                    .parse()
                    .with_context(|| format!("invalid comment total {total:?}"))?,
            },
            ("ignore", [user]) => Command::Ignore {
                user: user.to_string(),
            },
            ("unignore", [user]) => Command::Unignore {
                user: user.to_string(),
            },
            ("ignored", []) => Command::Ignored,
            ("history", [days]) => Command::History {
                days: days
                    .parse()
                    .with_context(|| format!("invalid number of days {days:?}"))?,
            },
            ("clear", []) => Command::Clear,
            _ => bail!("unrecognised command line: {name} {}\n\n{USAGE}", rest.join(" ")),
        };
        Ok(command)
    }
}

pub fn run() -> Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let command = Command::parse(&args)?;

    let cfg = config::load(config::LoadOptions::default()).context("load config")?;
    let area = SqliteArea::open(storage::Options {
        path: cfg.database_path(),
    })
    .context("open storage")?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let store = Arc::new(Store::open(Arc::new(area), clock.clone(), cfg.store_options()));

    let mut stdout = io::stdout().lock();
    execute(&command, &cfg, &store, clock, &mut stdout)?;

    store.flush();
    Ok(())
}

pub fn execute(
    command: &Command,
    cfg: &Config,
    store: &Arc<Store>,
    clock: Arc<dyn Clock>,
    out: &mut impl Write,
) -> Result<()> {
    let prefs = PreferenceManager::new(store.clone());
    match command {
        Command::Status { post_id } => {
            let read = store.read_comments(post_id);
            writeln!(out, "post {post_id}: {} read comments", read.len())?;
            if !read.is_empty() {
                writeln!(out, "{}", codec::encode(&read))?;
            }
        }
        Command::Process { snapshot, read_all } => {
            process(snapshot, *read_all, cfg, store, clock, out)?;
        }
        Command::Summary { post_id, total } => {
            let read = store.read_comments(post_id).len();
            match session::comment_count_label(*total, read) {
                Some(label) => writeln!(out, "{label}")?,
                None => writeln!(out, "No Comments")?,
            }
        }
        Command::Ignore { user } => {
            if prefs.ignore_user(user) {
                writeln!(out, "ignoring {user}")?;
            } else {
                writeln!(out, "{user} is already ignored")?;
            }
        }
        Command::Unignore { user } => {
            if prefs.unignore_user(user) {
                writeln!(out, "no longer ignoring {user}")?;
            } else {
                writeln!(out, "{user} is not ignored")?;
            }
        }
        Command::Ignored => {
            let users = prefs.ignored_users();
            if users.is_empty() {
                writeln!(out, "no ignored users")?;
            }
            for user in users {
                writeln!(out, "{user}")?;
            }
        }
        Command::History { days } => {
            let days = prefs.set_post_history_days(*days);
            writeln!(out, "keeping read history for {days} days")?;
        }
        Command::Clear => {
            store.clear_post_data();
            writeln!(out, "cleared read history")?;
        }
    }
    Ok(())
}

fn process(
    path: &Path,
    read_all: bool,
    cfg: &Config,
    store: &Arc<Store>,
    clock: Arc<dyn Clock>,
    out: &mut impl Write,
) -> Result<()> {
    let snapshot = Rc::new(ThreadSnapshot::load(path)?);
    let pattern = cfg.post_url_regex()?;
    let post_id = session::post_id_from_url(&snapshot.url, Some(&pattern))?;

    let ctx = SessionContext {
        store: store.clone(),
        scheduler: Scheduler::new(Rc::new(ManualFrames::new()), clock.clone()),
        clock,
        navigation: cfg.navigator_config(),
    };
    let mut session = ThreadSession::open(
        &ctx,
        &post_id,
        &*snapshot,
        snapshot.clone(),
        snapshot.anchor.as_deref(),
    )?;

    for comment in session.registry().iter() {
        let mut flags = Vec::new();
        if comment.is_new() {
            flags.push("new");
        }
        if comment.is_ignored() {
            flags.push("ignored");
        }
        writeln!(
            out,
            "{}\t{}\t{}",
            comment.id(),
            comment.author(),
            flags.join(",")
        )?;
    }

    let status = if read_all {
        session.navigator_mut().jump_to_end()
    } else {
        session.status()
    };
    writeln!(
        out,
        "post {post_id}: {} comments, {} unread, {} remaining",
        session.registry().len(),
        status.unread_count,
        status.remaining()
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::storage::MemoryArea;

    fn args(line: &str) -> Vec<String> {
        line.split_whitespace().map(str::to_string).collect()
    }

    fn run_line(store: &Arc<Store>, line: &str) -> String {
        let command = Command::parse(&args(line)).unwrap();
        let mut out = Vec::new();
        execute(
            &command,
            &Config::default(),
            store,
            Arc::new(ManualClock::new()),
            &mut out,
        )
        .unwrap();
        String::from_utf8(out).unwrap()
    }

    fn memory_store() -> Arc<Store> {
        Arc::new(Store::open(
            Arc::new(MemoryArea::default()),
            Arc::new(ManualClock::new()),
            Default::default(),
        ))
    }

    #[test]
    fn parses_commands() {
        assert_eq!(
            Command::parse(&args("process t.json --read-all")).unwrap(),
            Command::Process {
                snapshot: PathBuf::from("t.json"),
                read_all: true
            }
        );
        assert_eq!(
            Command::parse(&args("summary 5 12")).unwrap(),
            Command::Summary {
                post_id: "5".into(),
                total: 12
            }
        );
        assert!(Command::parse(&args("summary 5 many")).is_err());
        assert!(Command::parse(&args("status")).is_err());
        assert!(Command::parse(&[]).is_err());
    }

    #[test]
    fn ignore_list_commands() {
        let store = memory_store();
        assert_eq!(run_line(&store, "ignore Bob"), "ignoring Bob\n");
        assert_eq!(run_line(&store, "ignore bob"), "bob is already ignored\n");
        assert_eq!(run_line(&store, "ignored"), "Bob\n");
        assert_eq!(run_line(&store, "unignore BOB"), "no longer ignoring BOB\n");
        assert_eq!(run_line(&store, "ignored"), "no ignored users\n");
    }

    #[test]
    fn status_and_summary() {
        let store = memory_store();
        store.store_read_comments("8", &[100, 101, 105]);
        assert_eq!(
            run_line(&store, "status 8"),
            "post 8: 3 read comments\n100;1;4\n"
        );
        assert_eq!(run_line(&store, "summary 8 5"), "5 Comments (2 New)\n");
        assert_eq!(run_line(&store, "summary 9 0"), "No Comments\n");

        assert_eq!(run_line(&store, "clear"), "cleared read history\n");
        assert_eq!(run_line(&store, "status 8"), "post 8: 0 read comments\n");
    }

    #[test]
    fn process_marks_everything_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("thread.json");
        std::fs::write(
            &path,
            r#"{"url": "https://housingbubble.blog/?p=31",
                "comments": [
                    {"element_id": "comment-1", "author": "ann", "offset": 100},
                    {"element_id": "comment-2", "author": "Troll99", "offset": 300}
                ]}"#,
        )
        .unwrap();
        let store = memory_store();
        run_line(&store, "ignore troll98");

        let line = format!("process {} --read-all", path.display());
        let report = run_line(&store, &line);
        assert!(report.contains("1\tann\tnew\n"));
        assert!(report.contains("2\tTroll99\tnew,ignored\n"));
        assert!(report.contains("post 31: 2 comments, 2 unread, 0 remaining"));
        assert_eq!(store.read_comments("31"), vec![1, 2]);

        let report = run_line(&store, &format!("process {}", path.display()));
        assert!(report.contains("post 31: 2 comments, 0 unread, 0 remaining"));
    }
}
