pub mod delete;
pub mod export;
pub mod get;
pub mod init;
pub mod list;
pub mod reset;
pub mod search;

use xmemory::memory::MemoryDocument;

/// First line of `content`, cut to `max` characters.
fn preview(content: &str, max: usize) -> String {
    let line = content.lines().next().unwrap_or_default();
    if line.chars().count() > max {
        let cut: String = line.chars().take(max).collect();
        format!("{cut}...")
    } else {
        line.to_string()
    }
}

/// One-line listing entry followed by an indented preview.
fn print_entry(n: usize, doc: &MemoryDocument, score: Option<f64>) {
    let id = doc.id.as_deref().unwrap_or("-");
    let title = doc.title.as_deref().map(|t| format!(" {t}")).unwrap_or_default();
    match score {
        Some(score) => println!(
            "  {n}. [{}] {id}{title} (user: {}, score: {score:.4})",
            doc.memory_type, doc.user_id
        ),
        None => println!(
            "  {n}. [{}] {id}{title} (user: {}, created: {})",
            doc.memory_type,
            doc.user_id,
            doc.created_at.format("%Y-%m-%d %H:%M")
        ),
    }
    println!("     {}", preview(&doc.content, 120));
    println!();
}
