//! CLI entry point for keepfs-accounts: accounts file management tool.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use keepfs::auth::{Account, Auth};
use keepfs::store::FileStore;

#[derive(Parser)]
#[command(name = "keepfs-accounts", about = "keepfs accounts file management tool")]
struct Cli {
    /// Accounts file to load (and save to).
    #[arg(long, global = true, default_value = "./accounts.json")]
    accounts: PathBuf,

    /// Start from an empty store instead of loading the file.
    #[arg(long, global = true, default_value_t = false)]
    new: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create (or replace) an account
    Add {
        #[arg(long)]
        username: String,
        #[arg(long)]
        password: String,
        #[command(flatten)]
        grants: Grants,
    },
    /// Show an account; with --password, verify it as the server would
    Check {
        #[arg(long)]
        username: String,
        #[arg(long)]
        password: Option<String>,
    },
    /// Change an account's password or permissions
    Edit {
        #[arg(long)]
        username: String,
        #[arg(long)]
        password: Option<String>,
        #[command(flatten)]
        grants: Grants,
        /// Revoke read access to a pattern (repeatable)
        #[arg(long = "del-read")]
        del_read: Vec<String>,
        /// Revoke write access to a pattern (repeatable)
        #[arg(long = "del-write")]
        del_write: Vec<String>,
    },
    /// Remove an account
    Delete {
        #[arg(long)]
        username: String,
    },
}

#[derive(Args)]
struct Grants {
    /// Grant read access to a pattern (repeatable)
    #[arg(long = "add-read")]
    add_read: Vec<String>,
    /// Grant write access to a pattern (repeatable)
    #[arg(long = "add-write")]
    add_write: Vec<String>,
}

fn main() {
    let cli = Cli::parse();

    let auth = match open_auth(&cli.accounts, cli.new) {
        Ok(auth) => auth,
        Err(e) => {
            eprintln!("Error loading {}: {}", cli.accounts.display(), e);
            std::process::exit(1);
        }
    };

    let rc = match cli.command {
        Commands::Add {
            username,
            password,
            grants,
        } => run_add(&auth, &username, &password, &grants),
        Commands::Check { username, password } => run_check(&auth, &username, password.as_deref()),
        Commands::Edit {
            username,
            password,
            grants,
            del_read,
            del_write,
        } => run_edit(
            &auth,
            &username,
            password.as_deref(),
            &grants,
            &del_read,
            &del_write,
        ),
        Commands::Delete { username } => run_delete(&auth, &username),
    };
    std::process::exit(rc);
}

fn open_auth(path: &Path, new: bool) -> Result<Auth, keepfs::store::StoreError> {
    let store = if new {
        println!("Creating empty store");
        FileStore::empty(path)
    } else {
        println!("Loading store from {}", path.display());
        FileStore::open(path)?
    };
    Ok(Auth::from_store(Arc::new(store)))
}

fn run_add(auth: &Auth, username: &str, password: &str, grants: &Grants) -> i32 {
    if username.is_empty() || password.is_empty() {
        eprintln!("Error: a username and password are required");
        return 1;
    }

    let mut account = Account::new(username);
    if let Err(e) = account.set_password(password) {
        eprintln!("Error hashing password: {}", e);
        return 1;
    }
    for pattern in &grants.add_read {
        account.add_readable(pattern);
    }
    for pattern in &grants.add_write {
        account.add_writeable(pattern);
    }

    println!("Creating account {}", username);
    print_account(&account);
    save(auth.add_user(account))
}

fn run_check(auth: &Auth, username: &str, password: Option<&str>) -> i32 {
    let account = match password {
        Some(password) => match auth.get_account(username, password.as_bytes()) {
            Ok(account) => account,
            Err(e) => {
                eprintln!("Error: {}", e);
                return 1;
            }
        },
        None => match auth.view_account(username) {
            Some(account) => account,
            None => {
                eprintln!("Error: account {} not found", username);
                return 1;
            }
        },
    };

    println!("Found account {}", account.name());
    print_account(&account);
    0
}

fn run_edit(
    auth: &Auth,
    username: &str,
    password: Option<&str>,
    grants: &Grants,
    del_read: &[String],
    del_write: &[String],
) -> i32 {
    let Some(mut account) = auth.view_account(username) else {
        eprintln!("Error: account {} not found", username);
        return 1;
    };

    if let Some(password) = password {
        if let Err(e) = account.set_password(password) {
            eprintln!("Error hashing password: {}", e);
            return 1;
        }
        println!("Changed password");
    }
    for pattern in &grants.add_read {
        if account.add_readable(pattern) {
            println!("Added read access to {}", pattern);
        }
    }
    for pattern in &grants.add_write {
        if account.add_writeable(pattern) {
            println!("Added write access to {}", pattern);
        }
    }
    for pattern in del_read {
        if account.remove_readable(pattern) {
            println!("Removed read access to {}", pattern);
        }
    }
    for pattern in del_write {
        if account.remove_writeable(pattern) {
            println!("Removed write access to {}", pattern);
        }
    }

    print_account(&account);
    save(auth.add_user(account))
}

fn run_delete(auth: &Auth, username: &str) -> i32 {
    if auth.view_account(username).is_none() {
        eprintln!("Error: account {} not found", username);
        return 1;
    }
    println!("Deleting account {}", username);
    save(auth.delete_user(username))
}

fn print_account(account: &Account) {
    println!("  read:  {}", account.readable.join(", "));
    println!("  write: {}", account.writeable.join(", "));
}

fn save(result: Result<(), keepfs::store::StoreError>) -> i32 {
    match result {
        Ok(()) => 0,
        Err(e) => {
            eprintln!("Error saving accounts: {}", e);
            1
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn grants(read: &[&str], write: &[&str]) -> Grants {
        Grants {
            add_read: read.iter().map(|s| s.to_string()).collect(),
            add_write: write.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn test_add_edit_check_delete() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("accounts.json");
        let auth = open_auth(&path, true).unwrap();

        assert_eq!(run_add(&auth, "nick", "password", &grants(&["/foo"], &[])), 0);
        assert_eq!(run_check(&auth, "nick", Some("password")), 0);
        assert_eq!(run_check(&auth, "nick", Some("wrong")), 1);

        let rc = run_edit(
            &auth,
            "nick",
            None,
            &grants(&["/bar"], &["/uploads"]),
            &["/foo".to_string()],
            &[],
        );
        assert_eq!(rc, 0);

        let reloaded = open_auth(&path, false).unwrap();
        let nick = reloaded.view_account("nick").unwrap();
        assert_eq!(nick.readable, vec!["/bar"]);
        assert_eq!(nick.writeable, vec!["/uploads"]);
        assert!(nick.check_password(b"password"));

        assert_eq!(run_delete(&reloaded, "nick"), 0);
        assert_eq!(run_check(&reloaded, "nick", None), 1);
        assert_eq!(run_delete(&reloaded, "nick"), 1);
    }

    #[test]
    fn test_add_requires_credentials() {
        let tmp = TempDir::new().unwrap();
        let auth = open_auth(&tmp.path().join("accounts.json"), true).unwrap();
        assert_eq!(run_add(&auth, "nick", "", &grants(&[], &[])), 1);
        assert!(auth.view_account("nick").is_none());
    }

    #[test]
    fn test_edit_unknown_user_fails() {
        let tmp = TempDir::new().unwrap();
        let auth = open_auth(&tmp.path().join("accounts.json"), true).unwrap();
        assert_eq!(run_edit(&auth, "zach", None, &grants(&[], &[]), &[], &[]), 1);
    }
}
