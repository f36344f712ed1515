use clap::{Arg, ArgAction, ArgMatches, Command};
use std::error::Error;
use std::io::Write;
use std::path::{Path, PathBuf};

use sftpq::logging::init_tracing;
use sftpq::{Listing, Sftp, SftpConfig, Stat};

///////////////////////
// Utility functions //
///////////////////////

/// Config file first, then CLI flags on top
fn build_config(matches: &ArgMatches) -> Result<SftpConfig, Box<dyn Error>> {
	let mut config = match matches.get_one::<String>("config") {
		Some(path) => SftpConfig::load(Path::new(path))?,
		None => SftpConfig::default(),
	};

	if let Some(host) = matches.get_one::<String>("host") {
		config.host = host.clone();
	}
	if let Some(user) = matches.get_one::<String>("user") {
		config.username = Some(user.clone());
	}
	if let Some(port) = matches.get_one::<u16>("port") {
		config.port = *port;
	}
	if let Some(key) = matches.get_one::<String>("key") {
		config.private_key = Some(key.clone());
	}

	config.validate()?;
	Ok(config)
}

fn arg<'a>(matches: &'a ArgMatches, name: &str) -> Result<&'a str, Box<dyn Error>> {
	matches
		.get_one::<String>(name)
		.map(|s| s.as_str())
		.ok_or_else(|| format!("missing argument: {}", name).into())
}

fn print_listing(listing: &Listing, json: bool) -> Result<(), Box<dyn Error>> {
	if json {
		println!("{}", serde_json::to_string_pretty(listing)?);
	} else {
		for entry in &listing.entries {
			println!("{}", entry);
		}
	}
	Ok(())
}

fn print_stat(stat: &Stat, json: bool) -> Result<(), Box<dyn Error>> {
	if json {
		let value = serde_json::json!({
			"entry": stat.entry(),
			"mode": stat.mode(),
			"type": stat.file_type(),
		});
		println!("{}", serde_json::to_string_pretty(&value)?);
	} else {
		let entry = stat.entry();
		println!("  Path: {}", entry.path);
		println!("  Type: {:?}", stat.file_type());
		println!("  Mode: {:o} ({})", stat.mode(), entry.permissions);
		println!("  Size: {}", stat.size());
		println!("   Uid: {}  Gid: {}", stat.uid(), stat.gid());
		println!("Modify: {} {}", entry.date, entry.time);
	}
	Ok(())
}

async fn run(sftp: &Sftp, matches: &ArgMatches, json: bool) -> Result<(), Box<dyn Error>> {
	match matches.subcommand() {
		Some(("pwd", _)) => println!("{}", sftp.pwd().await?),
		Some(("ls", sub)) => {
			let path = sub.get_one::<String>("path").map(|s| s.as_str()).unwrap_or("");
			print_listing(&sftp.ls(path).await?, json)?;
		}
		Some(("stat", sub)) => print_stat(&sftp.stat(arg(sub, "path")?).await?, json)?,
		Some(("get", sub)) => {
			let local = PathBuf::from(arg(sub, "local")?);
			let size = sftp.get(arg(sub, "remote")?, &local).await?;
			eprintln!("{} bytes written to {}", size, local.display());
		}
		Some(("put", sub)) => sftp.put(Path::new(arg(sub, "local")?), arg(sub, "remote")?).await?,
		Some(("mkdir", sub)) => sftp.mkdir(arg(sub, "path")?).await?,
		Some(("rmdir", sub)) => sftp.rmdir(arg(sub, "path")?).await?,
		Some(("rm", sub)) => sftp.unlink(arg(sub, "path")?).await?,
		Some(("rename", sub)) => sftp.rename(arg(sub, "from")?, arg(sub, "to")?).await?,
		Some(("chmod", sub)) => {
			let mode = u32::from_str_radix(arg(sub, "mode")?, 8)
				.map_err(|e| format!("invalid octal mode: {}", e))?;
			sftp.chmod(arg(sub, "path")?, mode).await?;
		}
		Some(("cat", sub)) => {
			let data = sftp.read_file(arg(sub, "path")?).await?;
			std::io::stdout().write_all(&data)?;
		}
		_ => return Err("unknown subcommand".into()),
	}
	Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
	init_tracing("warn");

	let path_arg = || Arg::new("path").required(true);
	let matches = Command::new("sftpq")
		.version(env!("CARGO_PKG_VERSION"))
		.about("Queued client for the interactive sftp program")
		.subcommand_required(true)
		.arg(
			Arg::new("config")
				.short('c')
				.long("config")
				.value_name("FILE")
				.help("Config file (.toml, .json or .json5)"),
		)
		.arg(Arg::new("host").short('H').long("host").value_name("HOST").help("Remote host"))
		.arg(Arg::new("user").short('u').long("user").value_name("USER").help("Login user"))
		.arg(
			Arg::new("port")
				.short('P')
				.long("port")
				.value_name("PORT")
				.value_parser(clap::value_parser!(u16))
				.help("Remote port"),
		)
		.arg(
			Arg::new("key")
				.short('i')
				.long("key")
				.value_name("KEY")
				.help("Private key file or inline PEM"),
		)
		.arg(
			Arg::new("json")
				.long("json")
				.action(ArgAction::SetTrue)
				.help("Print listings and stat output as JSON"),
		)
		.subcommand(Command::new("pwd").about("Print the remote working directory"))
		.subcommand(
			Command::new("ls").about("List a remote directory").arg(Arg::new("path")),
		)
		.subcommand(Command::new("stat").about("Show remote file metadata").arg(path_arg()))
		.subcommand(
			Command::new("get")
				.about("Download a file")
				.arg(Arg::new("remote").required(true))
				.arg(Arg::new("local").required(true)),
		)
		.subcommand(
			Command::new("put")
				.about("Upload a file")
				.arg(Arg::new("local").required(true))
				.arg(Arg::new("remote").required(true)),
		)
		.subcommand(Command::new("mkdir").about("Create a remote directory").arg(path_arg()))
		.subcommand(Command::new("rmdir").about("Remove a remote directory").arg(path_arg()))
		.subcommand(Command::new("rm").about("Remove a remote file").arg(path_arg()))
		.subcommand(
			Command::new("rename")
				.about("Rename a remote path")
				.arg(Arg::new("from").required(true))
				.arg(Arg::new("to").required(true)),
		)
		.subcommand(
			Command::new("chmod")
				.about("Change remote permissions")
				.arg(Arg::new("mode").required(true).help("Octal mode, e.g. 755"))
				.arg(path_arg()),
		)
		.subcommand(Command::new("cat").about("Print a remote file").arg(path_arg()))
		.get_matches();

	let config = build_config(&matches)?;
	let json = matches.get_flag("json");

	let sftp = Sftp::new(config)?;
	sftp.connect().await?;
	let result = run(&sftp, &matches, json).await;
	if let Err(e) = sftp.disconnect().await {
		tracing::debug!("Disconnect failed: {}", e);
	}
	result
}

// vim: ts=4
