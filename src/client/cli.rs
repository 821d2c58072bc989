// ABOUTME: The interactive prompt: a thin line-oriented dispatcher over the
// ABOUTME: commands in the external CLI surface.

use crate::client::session::Session;
use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader};

pub async fn run(session: &Session) {
    let stdin = tokio::io::stdin();
    let mut lines = BufReader::new(stdin).lines();

    loop {
        print!("> ");
        let _ = std::io::stdout().flush();

        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) | Err(_) => break,
        };
        let mut parts = line.split_whitespace();
        let Some(cmd) = parts.next() else { continue };
        let arg = parts.next();

        match cmd {
            "exit" => break,
            "get_sync_dir" => report(session.get_sync_dir().await),
            "upload" => match arg {
                Some(path) => report(session.upload_path(std::path::Path::new(path)).await),
                None => eprintln!("usage: upload <path>"),
            },
            "download" => match arg {
                Some(name) => report(session.download(name).await),
                None => eprintln!("usage: download <name>"),
            },
            "delete" => match arg {
                Some(name) => report(session.delete(name).await),
                None => eprintln!("usage: delete <name>"),
            },
            "list_server" => match session.list_server().await {
                Ok(files) => print_listing(&files),
                Err(e) => eprintln!("list_server failed: {e}"),
            },
            "list_client" => match session.list_client().await {
                Ok(files) => print_listing(&files),
                Err(e) => eprintln!("list_client failed: {e}"),
            },
            other => eprintln!("unknown command: {other}"),
        }
    }
}

fn report(result: Result<(), crate::client::error::SyncError>) {
    if let Err(e) = result {
        eprintln!("error: {e}");
    }
}

fn print_listing(files: &[crate::model::listing::ListedFile]) {
    for file in files {
        println!("{}\t{} bytes", file.name, file.size);
    }
}
