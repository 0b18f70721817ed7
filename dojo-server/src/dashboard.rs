use dojo_api::{dashboard::relative_time, has_safe_scheme, Dashboard, Submission, TabKind, Time};
use pulldown_cmark::{escape::escape_html, CowStr, Event, Parser, Tag};

const PAGE: &str = include_str!("../res/dashboard.html");
const LINK: &str = include_str!("../res/link.html");
const SUBMISSION: &str = include_str!("../res/submission.html");

/// Renders the dashboard page, or an empty body when there is no dashboard to show
pub fn render(dashboard: Option<&Dashboard>, now: Time) -> String {
    let d = match dashboard {
        Some(d) => d,
        None => return String::new(),
    };
    let edit_profile = match d.can_edit_profile {
        true => r#"<a class="edit-profile" href="/settings">Edit Profile</a>"#,
        false => "",
    };
    let links = d
        .links
        .iter()
        .map(|l| {
            fill(
                LINK,
                &[
                    ("url", &*escaped(&l.url)),
                    ("icon", l.icon.name()),
                    ("label", &*escaped(&l.label)),
                ],
            )
        })
        .collect::<String>();
    let tabs = d
        .tabs
        .iter()
        .map(|t| match t.disabled {
            true => format!(
                "            <span class=\"tab-link\" aria-disabled=\"true\">{}</span>\n",
                escaped(&t.label),
            ),
            false => format!(
                "            <a class=\"tab-link\" href=\"?tab={}\"{}>{}</a>\n",
                t.kind.value(),
                if t.kind == d.default_tab { " aria-selected=\"true\"" } else { "" },
                escaped(&t.label),
            ),
        })
        .collect::<String>();
    let overview = format!(
        "{} in progress, {} solved",
        d.in_progress.len(),
        d.solutions.len()
    );
    let hidden = |kind: TabKind| match kind == d.default_tab {
        true => "",
        false => " hidden",
    };
    fill(
        PAGE,
        &[
            ("name", &*escaped(&d.user.name)),
            ("avatar", &*escaped(&d.avatar)),
            ("joined", &*escaped(&d.joined)),
            ("edit_profile", edit_profile),
            ("bio", &*render_markdown(&d.user.bio)),
            ("links", &*links),
            ("tabs", &*tabs),
            ("overview_hidden", hidden(TabKind::Overview)),
            ("overview", &*overview),
            ("in_progress_hidden", hidden(TabKind::InProgress)),
            ("in_progress", &*render_submissions(&d.in_progress, now)),
            ("solutions_hidden", hidden(TabKind::Solutions)),
            ("solutions", &*render_submissions(&d.solutions, now)),
        ],
    )
}

fn render_submissions(submissions: &[Submission], now: Time) -> String {
    submissions
        .iter()
        .map(|s| {
            fill(
                SUBMISSION,
                &[
                    ("difficulty", &*s.challenge.difficulty.as_str().to_ascii_lowercase()),
                    ("slug", &*escaped(&s.challenge.slug)),
                    ("challenge", &*escaped(&s.challenge.name)),
                    ("created_at", &*s.created_at.to_rfc3339()),
                    ("age", &*relative_time(s.created_at, now)),
                ],
            )
        })
        .collect()
}

/// Markdown to html, with raw html shown as text and script links dropped
fn render_markdown(md: &str) -> String {
    let parser = Parser::new(md).map(|event| match event {
        Event::Html(html) => Event::Text(html),
        Event::Start(Tag::Link(ty, url, title)) => {
            Event::Start(Tag::Link(ty, safe_url(url), title))
        }
        Event::End(Tag::Link(ty, url, title)) => Event::End(Tag::Link(ty, safe_url(url), title)),
        Event::Start(Tag::Image(ty, url, title)) => {
            Event::Start(Tag::Image(ty, safe_url(url), title))
        }
        Event::End(Tag::Image(ty, url, title)) => {
            Event::End(Tag::Image(ty, safe_url(url), title))
        }
        _ => event,
    });
    let mut html = String::new();
    pulldown_cmark::html::push_html(&mut html, parser);
    html
}

fn safe_url(url: CowStr) -> CowStr {
    match has_safe_scheme(&url) {
        true => url,
        false => CowStr::Borrowed(""),
    }
}

fn escaped(s: &str) -> String {
    let mut res = String::with_capacity(s.len());
    // writing into a String cannot fail
    let _ = escape_html(&mut res, s);
    res
}

/// Replaces each `{name}` of `template` by its value, in a single pass so that values are
/// never themselves interpreted as placeholders
fn fill(template: &str, vars: &[(&str, &str)]) -> String {
    let mut res = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        res.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        let var = after
            .find('}')
            .and_then(|end| vars.iter().find(|(name, _)| *name == &after[..end]));
        match var {
            Some((name, value)) => {
                res.push_str(value);
                rest = &after[name.len() + 1..];
            }
            None => {
                res.push('{');
                rest = after;
            }
        }
    }
    res.push_str(rest);
    res
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};
    use dojo_api::{
        Challenge, ChallengeId, Difficulty, LinkId, Role, Session, SubmissionId, UserId,
        UserLink, UserProfile, Uuid,
    };

    use super::*;

    fn now() -> Time {
        Utc.timestamp_opt(1_700_000_000, 0).unwrap()
    }

    fn dashboard(bio: &str, viewer_is_owner: bool) -> Dashboard {
        let user = UserProfile {
            id: UserId(Uuid::new_v4()),
            name: String::from("ada<3"),
            role: Role::User,
            bio: String::from(bio),
            image: None,
            created_at: now() - Duration::days(3),
            links: vec![UserLink {
                id: LinkId(1),
                url: String::from("https://github.com/ada"),
            }],
        };
        let viewer = Session {
            user: if viewer_is_owner { user.id } else { UserId::stub() },
            role: Role::User,
        };
        let submission = Submission {
            id: SubmissionId(1),
            user_id: user.id,
            challenge: Challenge {
                id: ChallengeId(1),
                slug: String::from("hello-world"),
                name: String::from("Hello World"),
                difficulty: Difficulty::Beginner,
                created_at: now(),
            },
            code: String::from("type HelloWorld = string"),
            is_successful: false,
            created_at: now() - Duration::hours(2),
        };
        Dashboard::build(user, vec![submission], Some(&viewer), now())
    }

    #[test]
    fn missing_dashboard_renders_empty_body() {
        assert_eq!(render(None, now()), "");
    }

    #[test]
    fn page_contents() {
        let page = render(Some(&dashboard("I *like* types", false)), now());
        assert!(page.contains("<h1>ada&lt;3</h1>"));
        assert!(page.contains(r#"src="/avatar.jpeg""#));
        assert!(page.contains("Joined 3 days ago"));
        assert!(page.contains("<em>like</em>"));
        assert!(page.contains(r#"href="https://github.com/ada""#));
        assert!(page.contains("icon-github"));
        assert!(page.contains(">github.com/ada</a>"));
        assert!(page.contains(r#"<a href="/challenge/hello-world">Hello World</a>"#));
        assert!(page.contains("2 hours ago"));
        assert!(page.contains(r#"href="?tab=in-progress" aria-selected="true">In-Progress</a>"#));
        assert!(page.contains(r#"href="?tab=solutions">Solutions</a>"#));
        assert!(page.contains(r#"<span class="tab-link" aria-disabled="true">Bookmarks</span>"#));
        assert!(!page.contains("?tab=bookmarks"));
        assert!(page.contains(r#"data-tab="in-progress">"#));
        assert!(page.contains(r#"data-tab="solutions" hidden"#));
        assert!(page.contains(r#"data-tab="overview" hidden"#));
        assert!(page.contains("1 in progress, 0 solved"));
        assert!(!page.contains("Edit Profile"));
    }

    #[test]
    fn owner_gets_edit_link() {
        let page = render(Some(&dashboard("", true)), now());
        assert!(page.contains(r#"href="/settings">Edit Profile"#));
    }

    #[test]
    fn bio_cannot_inject_markup() {
        let page = render(
            Some(&dashboard(
                "<script>alert(1)</script>\n\n[x](javascript:alert(1)) {name}",
                false,
            )),
            now(),
        );
        assert!(!page.contains("<script>"));
        assert!(page.contains("&lt;script&gt;"));
        assert!(!page.contains("javascript:"));
        assert!(page.contains("{name}"));
    }

    #[test]
    fn selecting_a_tab_shows_its_section() {
        let mut d = dashboard("", false);
        assert!(d.select_tab(TabKind::Solutions));
        let page = render(Some(&d), now());
        assert!(page.contains(r#"data-tab="solutions">"#));
        assert!(page.contains(r#"data-tab="in-progress" hidden"#));
        assert!(page.contains(r#"href="?tab=solutions" aria-selected="true""#));
        assert!(!page.contains(r#"href="?tab=in-progress" aria-selected"#));

        assert!(d.select_tab(TabKind::Overview));
        let page = render(Some(&d), now());
        assert!(page.contains(r#"data-tab="overview">"#));
        assert!(page.contains(r#"data-tab="solutions" hidden"#));
    }

    #[test]
    fn profile_urls_cannot_run_scripts() {
        let mut d = dashboard("", false);
        d.user.image = Some(String::from("javascript:alert(2)"));
        d.user.links.push(UserLink {
            id: LinkId(2),
            url: String::from("javascript:alert(document.cookie)"),
        });
        let d = Dashboard::build(d.user, Vec::new(), None, now());
        let page = render(Some(&d), now());
        assert!(!page.contains("javascript:"));
        assert!(page.contains(r#"src="/avatar.jpeg""#));
        assert!(page.contains(r#"href="https://github.com/ada""#));
    }

    #[test]
    fn fill_is_single_pass() {
        assert_eq!(fill("{a}-{b}", &[("a", "{b}"), ("b", "2")]), "{b}-2");
        assert_eq!(fill("{unknown} {", &[("a", "1")]), "{unknown} {");
    }
}
