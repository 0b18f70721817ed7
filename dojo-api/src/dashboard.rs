use anyhow::Context;

use crate::{Db, Session, Submission, Time, UserId, UserProfile};

/// Number of submissions shown on a dashboard
pub const RECENT_SUBMISSIONS: usize = 10;

pub const DEFAULT_AVATAR: &str = "/avatar.jpeg";

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum TabKind {
    Overview,
    InProgress,
    Solutions,
    Bookmarks,
    Comments,
}

impl TabKind {
    pub const ALL: [TabKind; 5] = [
        TabKind::Overview,
        TabKind::InProgress,
        TabKind::Solutions,
        TabKind::Bookmarks,
        TabKind::Comments,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            TabKind::Overview => "Overview",
            TabKind::InProgress => "In-Progress",
            TabKind::Solutions => "Solutions",
            TabKind::Bookmarks => "Bookmarks",
            TabKind::Comments => "Comments",
        }
    }

    /// Value used to identify the tab in the page markup
    pub fn value(&self) -> &'static str {
        match self {
            TabKind::Overview => "overview",
            TabKind::InProgress => "in-progress",
            TabKind::Solutions => "solutions",
            TabKind::Bookmarks => "bookmarks",
            TabKind::Comments => "comments",
        }
    }

    pub fn from_value(value: &str) -> Option<TabKind> {
        TabKind::ALL.into_iter().find(|k| k.value() == value)
    }

    // Bookmarks and comments are placeholders for now
    pub fn is_enabled(&self) -> bool {
        !matches!(self, TabKind::Bookmarks | TabKind::Comments)
    }
}

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Tab {
    pub kind: TabKind,
    pub label: String,
    pub disabled: bool,
}

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum LinkIcon {
    Github,
    Twitter,
    Linkedin,
    Youtube,
    Twitch,
    Discord,
    Link,
}

impl LinkIcon {
    pub fn for_url(url: &str) -> LinkIcon {
        let host = strip_protocol_and_www(url)
            .split(|c| c == '/' || c == '?' || c == '#')
            .next()
            .unwrap_or("")
            .to_ascii_lowercase();
        let is = |domain: &str| host == domain || host.ends_with(&format!(".{domain}"));
        if is("github.com") {
            LinkIcon::Github
        } else if is("twitter.com") || is("x.com") {
            LinkIcon::Twitter
        } else if is("linkedin.com") {
            LinkIcon::Linkedin
        } else if is("youtube.com") || is("youtu.be") {
            LinkIcon::Youtube
        } else if is("twitch.tv") {
            LinkIcon::Twitch
        } else if is("discord.gg") || is("discord.com") {
            LinkIcon::Discord
        } else {
            LinkIcon::Link
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            LinkIcon::Github => "github",
            LinkIcon::Twitter => "twitter",
            LinkIcon::Linkedin => "linkedin",
            LinkIcon::Youtube => "youtube",
            LinkIcon::Twitch => "twitch",
            LinkIcon::Discord => "discord",
            LinkIcon::Link => "link",
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct DashboardLink {
    pub url: String,
    pub label: String,
    pub icon: LinkIcon,
}

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Dashboard {
    pub user: UserProfile,
    pub avatar: String,
    pub joined: String,
    pub can_edit_profile: bool,
    pub links: Vec<DashboardLink>,
    pub tabs: Vec<Tab>,
    pub default_tab: TabKind,
    pub in_progress: Vec<Submission>,
    pub solutions: Vec<Submission>,
}

impl Dashboard {
    /// `submissions` is expected most recent first, which is kept in both lists
    pub fn build(
        user: UserProfile,
        submissions: Vec<Submission>,
        viewer: Option<&Session>,
        now: Time,
    ) -> Dashboard {
        let links = user
            .links
            .iter()
            // rows stored before scheme validation may still hold script urls
            .filter(|l| !l.url.is_empty() && crate::has_safe_scheme(&l.url))
            .map(|l| DashboardLink {
                url: l.url.clone(),
                label: String::from(strip_protocol_and_www(&l.url)),
                icon: LinkIcon::for_url(&l.url),
            })
            .collect();
        let tabs = TabKind::ALL
            .iter()
            .map(|k| Tab {
                kind: *k,
                label: String::from(k.label()),
                disabled: !k.is_enabled(),
            })
            .collect();
        let (solutions, in_progress): (Vec<Submission>, Vec<Submission>) =
            submissions.into_iter().partition(|s| s.is_successful);
        Dashboard {
            avatar: user
                .image
                .clone()
                .filter(|i| crate::has_safe_scheme(i))
                .unwrap_or_else(|| String::from(DEFAULT_AVATAR)),
            joined: format!("Joined {}", relative_time(user.created_at, now)),
            can_edit_profile: viewer.map(|s| s.user == user.id).unwrap_or(false),
            user,
            links,
            tabs,
            default_tab: TabKind::InProgress,
            in_progress,
            solutions,
        }
    }
}

impl Dashboard {
    /// Makes `kind` the tab shown when the page opens, unless it is disabled
    pub fn select_tab(&mut self, kind: TabKind) -> bool {
        if !kind.is_enabled() {
            return false;
        }
        self.default_tab = kind;
        true
    }
}

/// Loads the dashboard of `user` as seen by `viewer`, or `None` if there is no such user
pub async fn load_dashboard<D: Db>(
    db: &mut D,
    viewer: Option<&Session>,
    user: UserId,
    now: Time,
) -> anyhow::Result<Option<Dashboard>> {
    let profile = match db
        .fetch_user_profile(user)
        .await
        .with_context(|| format!("fetching profile of {user:?}"))?
    {
        Some(p) => p,
        None => {
            tracing::debug!(?user, "no such user, rendering an empty dashboard");
            return Ok(None);
        }
    };
    let submissions = db
        .fetch_recent_submissions(user, RECENT_SUBMISSIONS)
        .await
        .with_context(|| format!("fetching recent submissions of {user:?}"))?;
    Ok(Some(Dashboard::build(profile, submissions, viewer, now)))
}

pub fn strip_protocol_and_www(url: &str) -> &str {
    let url = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))
        .unwrap_or(url);
    url.strip_prefix("www.").unwrap_or(url)
}

/// Human-readable age of `then`, eg. "3 months ago"
pub fn relative_time(then: Time, now: Time) -> String {
    const UNITS: [(&str, i64); 6] = [
        ("year", 365 * 24 * 3600),
        ("month", 30 * 24 * 3600),
        ("week", 7 * 24 * 3600),
        ("day", 24 * 3600),
        ("hour", 3600),
        ("minute", 60),
    ];
    let secs = (now - then).num_seconds();
    for (unit, len) in UNITS {
        let n = secs / len;
        if n >= 1 {
            let plural = if n == 1 { "" } else { "s" };
            return format!("{n} {unit}{plural} ago");
        }
    }
    String::from("just now")
}
