use anyhow::{anyhow, Context};
use dojo_api::{
    AuthToken, Challenge, Difficulty, NewChallenge, NewSession, NewUser, Role, UserId, Uuid,
};

#[derive(structopt::StructOpt)]
struct Opt {
    #[structopt(short, long)]
    host: String,

    #[structopt(subcommand)]
    cmd: Command,
}

#[derive(structopt::StructOpt)]
enum Command {
    /// Create a user
    CreateUser {
        /// Username
        name: String,

        /// One of USER, MODERATOR or ADMIN
        #[structopt(long, default_value = "USER")]
        role: Role,

        /// Link to show on the profile, can be repeated
        #[structopt(long = "link")]
        links: Vec<String>,
    },

    /// Open a session for a user, printing its token
    CreateSession {
        /// Id of the user
        user: Uuid,

        /// Name of the device the session is for
        #[structopt(long, default_value = "dojo-ctl")]
        device: String,
    },

    /// Create a challenge
    CreateChallenge {
        /// Url-friendly identifier
        slug: String,

        /// Display name
        name: String,

        /// One of BEGINNER, EASY, MEDIUM, HARD or EXTREME
        difficulty: Difficulty,
    },
}

fn admin_token() -> anyhow::Result<AuthToken> {
    let tok =
        std::env::var("ADMIN_TOKEN").context("retrieving ADMIN_TOKEN environment variable")?;
    let tok = Uuid::try_parse(&tok).context("parsing ADMIN_TOKEN as an auth token")?;
    Ok(AuthToken(tok))
}

/// Turns error responses back into the error the server returned
async fn check(resp: reqwest::Response) -> anyhow::Result<reqwest::Response> {
    if resp.status().is_success() {
        return Ok(resp);
    }
    let status = resp.status();
    let body = resp.bytes().await.context("reading error response body")?;
    match dojo_api::Error::parse(&body) {
        Ok(err) => Err(anyhow!(err)).with_context(|| format!("server returned {status}")),
        Err(_) => Err(anyhow!(
            "server returned {status}: {}",
            String::from_utf8_lossy(&body)
        )),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let opt = <Opt as structopt::StructOpt>::from_args();

    let client = reqwest::Client::new();

    match opt.cmd {
        Command::CreateUser { name, role, links } => {
            let id = UserId(Uuid::new_v4());
            let mut user = NewUser::new(id, name);
            user.role = role;
            user.links = links;
            check(
                client
                    .post(format!("{}/api/admin/create-user", opt.host))
                    .json(&user)
                    .bearer_auth(admin_token()?.0)
                    .send()
                    .await?,
            )
            .await?;
            println!("{}", id.0);
        }
        Command::CreateSession { user, device } => {
            let tok: AuthToken = check(
                client
                    .post(format!("{}/api/admin/create-session", opt.host))
                    .json(&NewSession {
                        user: UserId(user),
                        device,
                    })
                    .bearer_auth(admin_token()?.0)
                    .send()
                    .await?,
            )
            .await?
            .json()
            .await
            .context("parsing session token")?;
            println!("{}", tok.0);
        }
        Command::CreateChallenge {
            slug,
            name,
            difficulty,
        } => {
            let challenge: Challenge = check(
                client
                    .post(format!("{}/api/admin/create-challenge", opt.host))
                    .json(&NewChallenge {
                        slug,
                        name,
                        difficulty,
                    })
                    .bearer_auth(admin_token()?.0)
                    .send()
                    .await?,
            )
            .await?
            .json()
            .await
            .context("parsing created challenge")?;
            println!(
                "{}",
                serde_json::to_string_pretty(&challenge).context("serializing challenge")?
            );
        }
    }

    Ok(())
}
