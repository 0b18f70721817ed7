use dojo_api::{Difficulty, Role};
use rand::{seq::SliceRandom, Rng};
use uuid::Uuid;

const NUM_USERS: usize = 5;
const MAX_LINKS_PER_USER: usize = 3;

const NUM_CHALLENGES: usize = 12;
const NUM_SOLUTIONS: usize = 20;
const NUM_SUBMISSIONS: usize = 120;

const NUM_TOP_COMMENTS: usize = 40;
const NUM_REPLIES: usize = 120;
const COMMENT_WORD_COUNT: usize = 25;

const LINK_HOSTS: [&str; 5] = [
    "https://github.com/",
    "https://twitter.com/",
    "https://www.linkedin.com/in/",
    "https://youtube.com/@",
    "https://example.com/~",
];

const DIFFICULTIES: [Difficulty; 5] = [
    Difficulty::Beginner,
    Difficulty::Easy,
    Difficulty::Medium,
    Difficulty::Hard,
    Difficulty::Extreme,
];

fn gen_n_items(table: &str, columns: &str, n: usize, mut f: impl FnMut(usize) -> String) {
    if n == 0 {
        return;
    }
    println!("INSERT INTO {} ({}) VALUES", table, columns);
    for i in 0..n {
        if i != 0 {
            println!(",");
        }
        print!("    {}", f(i));
    }
    println!();
    println!("ON CONFLICT DO NOTHING;");
}

/// Sequences are not advanced by explicit ids, catch them up with the inserted rows
fn fix_sequence(table: &str) {
    println!("SELECT setval('{table}_id_seq', (SELECT max(id) FROM {table}));");
}

fn quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

fn gen_text(words: usize) -> String {
    quote(&lipsum::lipsum_words(words))
}

fn gen_slug(i: usize) -> String {
    let words = lipsum::lipsum_words(2).to_lowercase();
    let words = words
        .chars()
        .filter(|c| c.is_ascii_lowercase() || *c == ' ')
        .collect::<String>();
    format!("{}-{i}", words.split_whitespace().collect::<Vec<_>>().join("-"))
}

fn main() {
    let mut rng = rand::thread_rng();

    // Generate users, the first one is an admin and the second one a moderator
    let mut users = Vec::new();
    gen_n_items("users", "id, name, role, bio", NUM_USERS, |i| {
        let uuid = Uuid::new_v4();
        users.push(uuid);
        let role = match i {
            0 => Role::Admin,
            1 => Role::Moderator,
            _ => Role::User,
        };
        format!(
            "('{}', 'user{}', '{}', {})",
            uuid,
            i,
            role.as_str(),
            gen_text(COMMENT_WORD_COUNT),
        )
    });

    let links = users
        .iter()
        .enumerate()
        .flat_map(|(i, u)| {
            let n = rng.gen_range(0..=MAX_LINKS_PER_USER);
            LINK_HOSTS
                .choose_multiple(&mut rng, n)
                .map(|host| (*u, format!("{host}user{i}")))
                .collect::<Vec<_>>()
        })
        .collect::<Vec<_>>();
    gen_n_items("user_links", "user_id, url", links.len(), |i| {
        format!("('{}', {})", links[i].0, quote(&links[i].1))
    });

    // Generate challenges
    gen_n_items(
        "challenges",
        "id, slug, name, difficulty",
        NUM_CHALLENGES,
        |i| {
            format!(
                "({}, '{}', {}, '{}')",
                i + 1,
                gen_slug(i),
                quote(&lipsum::lipsum_title()),
                DIFFICULTIES[i % DIFFICULTIES.len()].as_str(),
            )
        },
    );
    fix_sequence("challenges");
    let gen_challenge = || rand::thread_rng().gen_range(1..=NUM_CHALLENGES);

    // Generate solutions
    gen_n_items(
        "solutions",
        "id, challenge_id, user_id, title, description",
        NUM_SOLUTIONS,
        |i| {
            format!(
                "({}, {}, '{}', {}, {})",
                i + 1,
                gen_challenge(),
                users.choose(&mut rand::thread_rng()).expect("no users"),
                quote(&lipsum::lipsum_title()),
                gen_text(COMMENT_WORD_COUNT * 4),
            )
        },
    );
    fix_sequence("solutions");

    // Generate submissions, spread over the last days
    gen_n_items(
        "submissions",
        "user_id, challenge_id, code, is_successful, created_at",
        NUM_SUBMISSIONS,
        |_| {
            let mut rng = rand::thread_rng();
            format!(
                "('{}', {}, {}, {}, now() - interval '{} minutes')",
                users.choose(&mut rng).expect("no users"),
                gen_challenge(),
                gen_text(COMMENT_WORD_COUNT),
                rng.gen_bool(0.4),
                rng.gen_range(0..60 * 24 * 30),
            )
        },
    );

    // Generate comments, replies always point to an earlier comment on the same root
    let mut roots = Vec::new();
    gen_n_items(
        "comments",
        "id, text, user_id, parent_id, root_challenge_id, root_solution_id",
        NUM_TOP_COMMENTS + NUM_REPLIES,
        |i| {
            let mut rng = rand::thread_rng();
            let (parent, root) = match i < NUM_TOP_COMMENTS {
                true => {
                    let root = match rng.gen_bool(0.5) {
                        true => (Some(gen_challenge()), None),
                        false => (None, Some(rng.gen_range(1..=NUM_SOLUTIONS))),
                    };
                    (None, root)
                }
                false => {
                    let parent = rng.gen_range(0..i);
                    (Some(parent + 1), roots[parent])
                }
            };
            roots.push(root);
            let opt = |v: Option<usize>| {
                v.map(|v| v.to_string())
                    .unwrap_or_else(|| String::from("NULL"))
            };
            format!(
                "({}, {}, '{}', {}, {}, {})",
                i + 1,
                gen_text(COMMENT_WORD_COUNT),
                users.choose(&mut rng).expect("no users"),
                opt(parent),
                opt(root.0),
                opt(root.1),
            )
        },
    );
    fix_sequence("comments");
}
