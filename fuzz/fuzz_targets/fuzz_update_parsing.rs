#![no_main]

use libfuzzer_sys::fuzz_target;

use reelgrab::channels::telegram_inbound::{extract_inbound, BotCommand, TelegramUpdate};

fuzz_target!(|data: &[u8]| {
    // getUpdates payloads come from the network; parsing and extraction
    // must reject garbage without panicking.
    let Ok(update) = serde_json::from_slice::<TelegramUpdate>(data) else {
        return;
    };
    if let Some(message) = extract_inbound(&update) {
        let _ = BotCommand::parse(&message.text, Some("reel_grab_bot"));
    }
});
