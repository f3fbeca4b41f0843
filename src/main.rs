use std::io::{self, BufRead, Write};
use std::path::Path;

use clap::Parser;
use color_eyre::eyre::{bail, eyre, Result, WrapErr};
use komoot_gpx::output::{gpx_path, write_document, NamingOptions};
use komoot_gpx::{compile, ClientConfig, CompileOptions, KomootClient, Session, TourList, TourSummary};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod cli;

enum Selection {
    All,
    One(String),
}

/// Reads missing options from stdin, announcing interactive mode once.
#[derive(Default)]
struct Prompter {
    notice_shown: bool,
}

impl Prompter {
    fn prompt(&mut self, title: &str) -> Result<String> {
        self.ask(title, || {
            print!("> ");
            io::stdout().flush()?;
            let mut line = String::new();
            if io::stdin().lock().read_line(&mut line)? == 0 {
                return Ok(None);
            }
            Ok(Some(line))
        })
    }

    /// Like [`Prompter::prompt`], without echoing the typed characters.
    fn prompt_password(&mut self, title: &str) -> Result<String> {
        self.ask(title, || Ok(Some(rpassword::prompt_password("> ")?)))
    }

    /// Shows the interactive notice once, then asks until `read` yields a
    /// non-empty answer. `None` from `read` means input has ended.
    fn ask<F>(&mut self, title: &str, mut read: F) -> Result<String>
    where
        F: FnMut() -> Result<Option<String>>,
    {
        if !self.notice_shown {
            println!("Interactive mode. Use '--help' for usage details.");
            self.notice_shown = true;
        }

        loop {
            println!("\n{title}");
            let Some(line) = read()? else {
                bail!("No input given for '{title}'");
            };
            let value = line.trim();
            if value.is_empty() {
                println!("Invalid input");
                continue;
            }
            return Ok(value.to_string());
        }
    }
}

struct Downloader<'a> {
    client: &'a KomootClient,
    output_dir: &'a Path,
    compile_options: CompileOptions,
    naming: NamingOptions,
    skip_existing: bool,
}

impl Downloader<'_> {
    fn make_gpx(&self, tour_id: &str, summary: Option<&TourSummary>) -> Result<()> {
        if let Some(summary) = summary {
            let path = gpx_path(self.output_dir, tour_id, &summary.name, summary.date, &self.naming);
            if self.skip_existing && path.exists() {
                info!("{} skipped - already exists at '{}'", summary.name, path.display());
                return Ok(());
            }
        }

        let tour = self.client.fetch_tour_detail(tour_id)?;
        let path = gpx_path(self.output_dir, tour_id, &tour.name, Some(tour.date), &self.naming);
        if self.skip_existing && summary.is_none() && path.exists() {
            info!("{} skipped - already exists at '{}'", tour.name, path.display());
            return Ok(());
        }

        let document = compile(&tour, self.client, &self.compile_options)?;
        write_document(&path, &document)
            .wrap_err_with(|| format!("Failed to write '{}'", path.display()))?;

        info!("GPX file written to '{}'", path.display());
        Ok(())
    }
}

fn init_logging(verbose: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if verbose { "debug" } else { "info" }));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn print_tours(tours: &TourList) {
    for tour in tours.iter() {
        println!("{}", tour.listing());
    }
}

fn main() -> Result<()> {
    color_eyre::install()?;

    let args = cli::Cli::parse();
    init_logging(args.verbose);

    if args.anonymous && args.make_all {
        bail!("Cannot get all user's routes in anonymous mode, use --make-gpx");
    }
    if args.anonymous && (args.mail.is_some() || args.password.is_some() || args.token.is_some()) {
        bail!("Cannot specify login/password in anonymous mode");
    }

    let mut client = KomootClient::new(ClientConfig {
        base_url: args.api_base.clone(),
        debug_dir: args.debug_dir.clone(),
    })?;
    let mut prompter = Prompter::default();

    let tours = if args.anonymous {
        None
    } else {
        let mail = match &args.mail {
            Some(mail) => mail.clone(),
            None => prompter.prompt("Enter your mail address (komoot login)")?,
        };
        match (&args.token, &args.password) {
            (Some(token), _) => client.set_session(Session::from_token(mail, token.clone())),
            (None, Some(password)) => {
                client.login(&mail, password)?;
            }
            (None, None) => {
                let password = prompter.prompt_password("Enter your password (input hidden)")?;
                client.login(&mail, &password)?;
            }
        }

        let user_id = client
            .session()
            .map(|session| session.user_id.clone())
            .ok_or_else(|| eyre!("Not logged in"))?;
        let tours = client.fetch_tour_list(&user_id, args.filter)?;
        if args.list_tours {
            print_tours(&tours);
            return Ok(());
        }
        Some(tours)
    };

    let selection = if args.make_all {
        Selection::All
    } else if let Some(id) = &args.make_gpx {
        Selection::One(id.clone())
    } else {
        if let Some(tours) = &tours {
            print_tours(tours);
        }
        match prompter.prompt("Enter a tour id to download")?.as_str() {
            "all" => Selection::All,
            id => Selection::One(id.to_string()),
        }
    };

    let downloader = Downloader {
        client: &client,
        output_dir: &args.output,
        compile_options: CompileOptions {
            include_pois: !args.no_poi,
            max_description_length: args.max_desc_length,
        },
        naming: NamingOptions {
            add_date: args.add_date,
            max_title_length: args.max_title_length(),
        },
        skip_existing: args.skip_existing && !args.anonymous,
    };

    match selection {
        Selection::All => {
            let Some(tours) = &tours else {
                bail!("Cannot get all user's routes in anonymous mode, use --make-gpx");
            };
            for tour in tours.iter() {
                downloader
                    .make_gpx(&tour.id, Some(tour))
                    .wrap_err_with(|| format!("Failed to convert tour '{}'", tour.id))?;
            }
        }
        Selection::One(id) => {
            let summary = tours.as_ref().and_then(|tours| tours.get(&id));
            if tours.is_some() && summary.is_none() {
                warn!("This id ({id}) is not one of your tours. Use --list-tours to view complete list.");
            }
            downloader
                .make_gpx(&id, summary)
                .wrap_err_with(|| format!("Failed to convert tour '{id}'"))?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ask_retries_on_empty_input() {
        let mut answers = vec![Some("  \n".to_string()), Some(" 4711\n".to_string())].into_iter();
        let mut prompter = Prompter::default();

        let value = prompter
            .ask("Enter a tour id to download", || Ok(answers.next().flatten()))
            .unwrap();
        assert_eq!(value, "4711");
        assert!(prompter.notice_shown);
        assert_eq!(answers.next(), None);
    }

    #[test]
    fn test_ask_fails_when_input_ends() {
        let mut prompter = Prompter::default();
        let err = prompter.ask("Enter your password", || Ok(None)).unwrap_err();
        assert!(err.to_string().contains("Enter your password"));
    }
}
