//! One function per page.

use super::{download_url, escape, layout, song_url, time_ago, user_url};
use crate::models::{
    comment::CommentWithAuthor,
    song::{Song, SongWithArtist},
    user::User,
};
use axum::response::Html;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};

/// Like widget state for one reference.
#[derive(Debug, Clone, Copy, Default)]
pub struct LikeState {
    pub count: i64,
    pub liked: bool,
}

fn like_button(ref_id: i64, ref_type: &str, state: LikeState) -> String {
    format!(
        r#"<button class="like{active}" data-ref-id="{ref_id}" data-ref-type="{ref_type}">♥ <span class="like-count">{count}</span></button>"#,
        active = if state.liked { " liked" } else { "" },
        ref_id = ref_id,
        ref_type = ref_type,
        count = state.count,
    )
}

pub fn index(current_user: Option<&str>, recent: &[SongWithArtist], now: DateTime<Utc>) -> Html<String> {
    let mut content = String::from("<h1>Recent uploads</h1>");
    if recent.is_empty() {
        content.push_str("<p>Nothing here yet.</p>");
    } else {
        content.push_str(r#"<ul class="songs">"#);
        for entry in recent {
            content.push_str(&format!(
                r#"<li><a href="{song}">{title}</a> by <a href="{artist_url}">{artist}</a> <time>{ago}</time></li>"#,
                song = escape(&song_url(&entry.artist, &entry.song.title)),
                title = escape(&entry.song.title),
                artist_url = escape(&user_url(&entry.artist)),
                artist = escape(&entry.artist),
                ago = time_ago(entry.song.created, now),
            ));
        }
        content.push_str("</ul>");
    }
    layout("Home", current_user, &content)
}

pub fn login() -> Html<String> {
    layout(
        "Log in",
        None,
        concat!(
            "<h1>Log in</h1>",
            r#"<form method="post" action="/guest/login">"#,
            r#"<label>Username <input name="username" autocomplete="username" required></label>"#,
            r#"<label>Password <input type="password" name="password" autocomplete="current-password" required></label>"#,
            r#"<button type="submit">Log in</button></form>"#,
            r#"<p>No account? <a href="/guest/register">Register</a></p>"#
        ),
    )
}

pub fn register() -> Html<String> {
    layout(
        "Register",
        None,
        concat!(
            "<h1>Register</h1>",
            r#"<form method="post" action="/guest/register">"#,
            r#"<label>Email <input type="email" name="email" required></label>"#,
            r#"<label>Username <input name="username" pattern="[a-z0-9.\-]{3,63}" title="3-63 lowercase letters, digits, dots or hyphens" required></label>"#,
            r#"<label>Password <input type="password" name="password" autocomplete="new-password" required></label>"#,
            r#"<button type="submit">Register</button></form>"#
        ),
    )
}

pub fn upload(current_user: &str) -> Html<String> {
    layout(
        "Upload",
        Some(current_user),
        concat!(
            "<h1>Upload a song</h1>",
            r#"<form method="post" action="/active/upload" enctype="multipart/form-data">"#,
            r#"<label>Title <input name="songTitle"></label>"#,
            r#"<label>Description <textarea name="songDesc"></textarea></label>"#,
            r#"<label>File <input type="file" name="file" accept="audio/*" required></label>"#,
            r#"<button type="submit">Upload</button></form>"#
        ),
    )
}

pub fn profile(
    current_user: Option<&str>,
    user: &User,
    uploads: &[Song],
    likes: LikeState,
    now: DateTime<Utc>,
) -> Html<String> {
    let mut content = format!(
        r#"<h1>{name}</h1><p class="meta">Member since {since} {like}</p><h2>Uploads</h2>"#,
        name = escape(&user.username),
        since = user.created_at().format("%B %Y"),
        like = like_button(user.id, "user", likes),
    );
    if uploads.is_empty() {
        content.push_str("<p>No uploads yet.</p>");
    } else {
        content.push_str(r#"<ul class="songs">"#);
        for song in uploads {
            content.push_str(&format!(
                r#"<li><a href="{url}">{title}</a> <time>{ago}</time></li>"#,
                url = escape(&song_url(&user.username, &song.title)),
                title = escape(&song.title),
                ago = time_ago(song.created, now),
            ));
        }
        content.push_str("</ul>");
    }
    layout(&user.username, current_user, &content)
}

/// Everything the song page shows.
pub struct SongPage<'a> {
    pub current_user: Option<&'a str>,
    pub artist: &'a str,
    pub song: &'a Song,
    pub likes: LikeState,
    pub comments: &'a [CommentWithAuthor],
    pub comment_likes: &'a HashMap<i64, LikeState>,
    pub now: DateTime<Utc>,
}

pub fn song(page: SongPage<'_>) -> Html<String> {
    let SongPage {
        current_user,
        artist,
        song,
        likes,
        comments,
        comment_likes,
        now,
    } = page;

    let download = escape(&download_url(artist, &song.title));
    let mut content = format!(
        concat!(
            r#"<h1>{title}</h1>"#,
            r#"<p class="meta">by <a href="{artist_url}">{artist}</a> <time>{ago}</time> {like}</p>"#,
            r#"<audio controls preload="none" src="{download}"></audio>"#,
            r#"<p><a href="{download}" download="{filename}">Download</a></p>"#,
            r#"<p class="description">{description}</p>"#,
            "<h2>Comments</h2>"
        ),
        title = escape(&song.title),
        artist_url = escape(&user_url(artist)),
        artist = escape(artist),
        ago = time_ago(song.created, now),
        like = like_button(song.id, "song", likes),
        download = download,
        filename = escape(song.download_name()),
        description = escape(&song.description),
    );

    content.push_str(&comment_thread(comments, comment_likes, song.id, current_user.is_some(), now));

    if current_user.is_some() {
        content.push_str(&comment_form(song.id, None));
    } else {
        content.push_str(r#"<p><a href="/guest/login">Log in</a> to comment.</p>"#);
    }

    layout(&song.title, current_user, &content)
}

fn comment_form(song_id: i64, parent: Option<i64>) -> String {
    let parent_field = parent
        .map(|id| format!(r#"<input type="hidden" name="parent_id" value="{}">"#, id))
        .unwrap_or_default();
    format!(
        concat!(
            r#"<form class="comment" method="post" action="/active/comment">"#,
            r#"<input type="hidden" name="song_id" value="{song_id}">{parent_field}"#,
            r#"<textarea name="text" required></textarea>"#,
            r#"<button type="submit">{label}</button></form>"#
        ),
        song_id = song_id,
        parent_field = parent_field,
        label = if parent.is_some() { "Reply" } else { "Comment" },
    )
}

/// Render comments as nested lists. Replies whose parent is missing are shown
/// at the top level.
///
/// Walks the thread with an explicit stack so reply depth is bounded only by
/// memory.
fn comment_thread(
    comments: &[CommentWithAuthor],
    comment_likes: &HashMap<i64, LikeState>,
    song_id: i64,
    can_reply: bool,
    now: DateTime<Utc>,
) -> String {
    if comments.is_empty() {
        return "<p>No comments yet.</p>".to_string();
    }

    let known: HashSet<i64> = comments.iter().map(|c| c.comment.id).collect();
    let mut children: HashMap<Option<i64>, Vec<&CommentWithAuthor>> = HashMap::new();
    for entry in comments {
        let parent = entry.comment.comment_id.filter(|id| known.contains(id));
        children.entry(parent).or_default().push(entry);
    }

    enum Step<'a> {
        Open(&'a CommentWithAuthor),
        CloseItem,
        CloseList,
    }

    fn push_group<'a>(stack: &mut Vec<Step<'a>>, out: &mut String, entries: &[&'a CommentWithAuthor]) {
        out.push_str(r#"<ul class="comments">"#);
        stack.push(Step::CloseList);
        stack.extend(entries.iter().rev().map(|entry| Step::Open(*entry)));
    }

    let mut out = String::new();
    let mut stack = Vec::new();
    if let Some(roots) = children.get(&None) {
        push_group(&mut stack, &mut out, roots);
    }

    while let Some(step) = stack.pop() {
        match step {
            Step::Open(entry) => {
                let id = entry.comment.id;
                out.push_str(&format!(
                    r#"<li id="comment-{id}"><p><a href="{author_url}">{author}</a> <time>{ago}</time> {like}</p><p>{text}</p>"#,
                    id = id,
                    author_url = escape(&user_url(&entry.author)),
                    author = escape(&entry.author),
                    ago = time_ago(entry.comment.created, now),
                    like = like_button(id, "comment", comment_likes.get(&id).copied().unwrap_or_default()),
                    text = escape(&entry.comment.text),
                ));
                if can_reply {
                    out.push_str(&format!(
                        "<details><summary>Reply</summary>{}</details>",
                        comment_form(song_id, Some(id))
                    ));
                }
                stack.push(Step::CloseItem);
                if let Some(replies) = children.get(&Some(id)) {
                    push_group(&mut stack, &mut out, replies);
                }
            }
            Step::CloseItem => out.push_str("</li>"),
            Step::CloseList => out.push_str("</ul>"),
        }
    }
    out
}

pub fn settings(user: &User, uploads: &[Song]) -> Html<String> {
    let mut content = format!(
        r#"<h1>Settings</h1><dl><dt>Username</dt><dd>{name}</dd><dt>Email</dt><dd>{email}</dd></dl><h2>Your songs</h2>"#,
        name = escape(&user.username),
        email = escape(&user.email),
    );

    if uploads.is_empty() {
        content.push_str("<p>No uploads yet.</p>");
    } else {
        content.push_str(r#"<ul class="songs">"#);
        for song in uploads {
            content.push_str(&format!(
                concat!(
                    r#"<li><a href="{url}">{title}</a>"#,
                    r#"<form class="inline" method="post" action="/active/song/delete">"#,
                    r#"<input type="hidden" name="song_id" value="{id}">"#,
                    r#"<button type="submit">Delete</button></form></li>"#
                ),
                url = escape(&song_url(&user.username, &song.title)),
                title = escape(&song.title),
                id = song.id,
            ));
        }
        content.push_str("</ul>");
    }

    content.push_str(concat!(
        "<h2>Delete account</h2>",
        "<p>This removes your songs, comments and likes.</p>",
        r#"<form method="post" action="/active/delete">"#,
        r#"<label>Password <input type="password" name="password" required></label>"#,
        r#"<button type="submit" class="danger">Delete my account</button></form>"#
    ));

    layout("Settings", Some(&user.username), &content)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn comment(id: i64, parent: Option<i64>, text: &str) -> CommentWithAuthor {
        CommentWithAuthor {
            comment: crate::models::comment::Comment {
                id,
                text: text.to_string(),
                created: 0,
                user_id: 1,
                comment_id: parent,
                song_id: 1,
            },
            author: "bob".to_string(),
        }
    }

    #[test]
    fn replies_nest_under_their_parent() {
        let comments = vec![
            comment(1, None, "root"),
            comment(2, Some(1), "reply"),
            comment(3, Some(99), "orphan"),
        ];
        let html = comment_thread(&comments, &HashMap::new(), 1, false, Utc::now());

        let root = html.find("root").unwrap();
        let reply = html.find("reply").unwrap();
        let nested_list = html[root..].find(r#"<ul class="comments">"#).unwrap() + root;
        assert!(nested_list < reply);
        assert!(html.contains("orphan"));
        assert!(!html.contains("<details>"));
    }

    #[test]
    fn long_reply_chains_render_on_a_small_stack() {
        let depth = 20_000;
        let comments: Vec<_> = (1..=depth)
            .map(|id| comment(id, (id > 1).then(|| id - 1), "deep"))
            .collect();

        let html = std::thread::Builder::new()
            .stack_size(256 * 1024)
            .spawn(move || comment_thread(&comments, &HashMap::new(), 1, false, Utc::now()))
            .unwrap()
            .join()
            .unwrap();

        assert_eq!(html.matches(r#"<ul class="comments">"#).count(), depth as usize);
        assert_eq!(html.matches("</ul>").count(), depth as usize);
        assert!(html.ends_with("</li></ul>"));
    }

    #[test]
    fn siblings_keep_posting_order() {
        let comments = vec![
            comment(1, None, "first"),
            comment(2, Some(1), "reply"),
            comment(3, None, "second"),
        ];
        let html = comment_thread(&comments, &HashMap::new(), 1, false, Utc::now());
        let first = html.find("first").unwrap();
        let reply = html.find("reply").unwrap();
        let second = html.find("second").unwrap();
        assert!(first < reply && reply < second);
        assert!(html.starts_with(r#"<ul class="comments"><li id="comment-1">"#));
    }

    #[test]
    fn comment_text_is_escaped() {
        let comments = vec![comment(1, None, "<script>alert(1)</script>")];
        let html = comment_thread(&comments, &HashMap::new(), 1, true, Utc::now());
        assert!(!html.contains("<script>"));
        assert!(html.contains("&lt;script&gt;"));
        assert!(html.contains(r#"name="parent_id" value="1""#));
    }
}
