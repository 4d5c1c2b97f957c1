//! The offline dump (§4.6): renders the live graph back into the wire line
//! grammar and writes it as a WAL file a fresh server can replay, without
//! needing any of the log history that produced the current state.
//!
//! Per §4.6: all non-post entities (users, tags, aliases, implications) are
//! written in one transaction timestamped "now"; each post gets its own
//! transaction timestamped by that post's `modified` time; the file ends
//! with an `L<next-log-index>` line. Dump transactions never fsync — a
//! crash mid-dump just means starting the dump over, not data loss, since
//! the live server's own WAL is untouched.

use tracing::info;
use wellpapp_error::Result;
use wellpapp_graph::Store;
use wellpapp_wal::WalWriter;

/// Writes a full dump of `store` into a fresh WAL file under `log_dir` at
/// `log_index`, ending with the `L` line naming `next_log_index`. Returns
/// the path of the file written.
pub fn write_dump(store: &Store, log_dir: &std::path::Path, log_index: u32, now: i64, next_log_index: u32) -> Result<std::path::PathBuf> {
    let mut wal = WalWriter::create(log_dir, log_index)?;
    let mut trans_id = 0u64;

    trans_id += 1;
    let tx = wal.begin_transaction(trans_id, now as u64)?;
    for user in store.users.values() {
        if user.name == "anonymous" {
            continue;
        }
        wal.write_data(trans_id, &render_add_user(user))?;
    }
    for tag in store.tags.values() {
        wal.write_data(trans_id, &render_add_tag(tag))?;
    }
    for alias in store.tag_aliases.values() {
        wal.write_data(trans_id, &render_add_alias(alias))?;
    }
    for tag in store.tags.values() {
        for rule in &tag.implications {
            wal.write_data(trans_id, &render_implication(tag.guid, rule))?;
        }
    }
    wal.commit_transaction(&tx, false)?;

    for post in store.posts.values() {
        trans_id += 1;
        let tx = wal.begin_transaction(trans_id, post.modified as u64)?;
        wal.write_data(trans_id, &render_add_post(post))?;
        for (guid, weak) in &post.explicit {
            wal.write_data(trans_id, &render_tag_edit(post, *guid, *weak))?;
        }
        wal.commit_transaction(&tx, false)?;
    }

    wal.write_next_log_index(next_log_index)?;
    info!(posts = store.posts.len(), tags = store.tags.len(), "wrote offline dump");
    Ok(wal.path().to_path_buf())
}

fn render_add_user(user: &wellpapp_graph::User) -> String {
    format!("AU{:x} {} {}", user.capabilities.bits(), user.password_hash, user.name)
}

fn render_add_tag(tag: &wellpapp_graph::Tag) -> String {
    format!("AT{} G{} {}", tag.tag_type as u16, tag.guid, tag.name)
}

fn render_add_alias(alias: &wellpapp_graph::TagAlias) -> String {
    format!("AL{} {}", alias.target, alias.name)
}

fn render_implication(from: wellpapp_types::Guid, rule: &wellpapp_graph::ImplicationRule) -> String {
    let sign = if rule.positive { "+" } else { "-" };
    format!("I{} I{} {sign} P{}", from, rule.to_tag, rule.priority)
}

fn render_add_post(post: &wellpapp_graph::Post) -> String {
    format!(
        "AP{} S{} U{} R{} W{} H{} E{} G{} N{}",
        post.hash,
        post.source,
        post.user_id,
        post.score,
        post.width,
        post.height,
        post.file_type as u16,
        post.rating as u16,
        post.title,
    )
}

fn render_tag_edit(post: &wellpapp_graph::Post, guid: wellpapp_types::Guid, weak: bool) -> String {
    format!("TP{} T{}{}", post.hash, if weak { "~" } else { "" }, guid)
}
