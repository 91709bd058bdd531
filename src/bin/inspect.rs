//! echo-inspect：查看会话存储中的用户状态
//!
//! 用法：`echo-inspect [user_id]`，不带参数时列出全部用户。

use anyhow::Context;
use echo::config::load_config;
use echo::core::SessionState;
use echo::store::create_session_store;

fn print_state(state: &SessionState) {
    println!("user:            {}", state.user_id);
    println!("name:            {}", state.user_name.as_deref().unwrap_or("-"));
    println!("messages:        {}", state.message_count);
    println!("crisis flag:     {}", state.crisis_flag);
    println!("favorite coping: {}", state.favorite_coping.as_deref().unwrap_or("-"));
    let moods: Vec<String> = state.mood_history.iter().map(|m| m.to_string()).collect();
    println!("moods:           [{}]", moods.join(", "));
    if let (Some(at), Some(count)) = (state.last_report_at, state.last_report_at_count) {
        println!("last report:     {} (message {})", at.to_rfc3339(), count);
    }
    if let Some(last) = state.history.messages().last() {
        println!("last message:    [{:?}] {}", last.role, last.content);
    }
    println!();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    echo::observability::init();

    let cfg = load_config(None).context("Failed to load config")?;
    let store = create_session_store(&cfg.store).context("Failed to open session store")?;

    match std::env::args().nth(1) {
        Some(user_id) => match store.get(&user_id).await? {
            Some(state) => print_state(&state),
            None => println!("no session for user '{}'", user_id),
        },
        None => {
            let states = store.list().await?;
            if states.is_empty() {
                println!("no sessions stored");
            }
            for state in &states {
                print_state(state);
            }
        }
    }
    Ok(())
}
