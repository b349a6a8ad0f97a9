pub enum LocalCommand {
    /// Print the engine's speaker catalogue
    Speakers,

    /// Switch the speaker for the rest of the session
    UseSpeaker(String),

    /// Stop whatever is playing
    Stop,

    Help,

    /// A command to exit the app was detected
    Exit,

    /// Not a command; the line should be read aloud.
    Text,
}

pub const HELP: &str = "/speakers        list available speakers\n\
/speaker <id>    switch speaker\n\
/stop            stop playback\n\
/quit            exit";

pub fn parse_local_command(input: &str) -> LocalCommand {
    let input = input.trim();
    let (command, arg) = match input.split_once(char::is_whitespace) {
        Some((command, arg)) => (command, arg.trim()),
        None => (input, ""),
    };
    match command {
        "/speakers" => LocalCommand::Speakers,
        "/speaker" if !arg.is_empty() => LocalCommand::UseSpeaker(arg.to_string()),
        "/speaker" | "/help" => LocalCommand::Help,
        "/stop" => LocalCommand::Stop,
        "/exit" | "/quit" => LocalCommand::Exit,
        _ => LocalCommand::Text,
    }
}
