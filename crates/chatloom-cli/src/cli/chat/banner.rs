//! Welcome banner display for chat sessions.

use console::style;

/// Print the welcome banner at the start of a chat.
pub fn print_welcome_banner(model: &str, sessions: usize, storage: &str) {
    println!();
    println!("  {} {}", style("◆").cyan(), style("chatloom").cyan().bold());
    println!();
    println!("  {}    {}", style("Model:").bold(), style(model).dim());
    println!(
        "  {} {} {}",
        style("Sessions:").bold(),
        style(sessions).dim(),
        style(format!("({storage})")).dim()
    );
    println!();
    println!(
        "  {}",
        style("Type /help for commands, Ctrl+C to stop a reply, Ctrl+D to exit").dim()
    );
    println!("  {}", style("---").dim());
    println!();
}
