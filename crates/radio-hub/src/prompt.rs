//! DJ prompt construction and reply parsing.

use radio_core::{GeneratorError, PickRequest};

/// Build the prompt for one radio pick.
pub fn build_prompt(request: &PickRequest, persona: &str, language: &str) -> String {
    let mut prompt = format!(
        "You are {persona}, hosting a continuous music radio. Always speak {language}.\n"
    );
    match request.mood.as_deref() {
        Some(target) => prompt.push_str(&format!(
            "Every song must be by or firmly within \"{target}\". \
             Once the obvious hits are used up, dig deeper into the catalog.\n"
        )),
        None => {
            if request.recent.is_empty() {
                prompt.push_str("Pick a well-known song that sets a good mood.\n");
            } else {
                prompt.push_str(&format!(
                    "Keep the vibe of the recently played songs: {}.\n",
                    request.recent.join("; ")
                ));
            }
        }
    }
    if !request.avoid.is_empty() {
        prompt.push_str(&format!(
            "Do not pick any of these: {}.\n",
            request.avoid.join("; ")
        ));
    }
    if request.session_start {
        prompt.push_str("The radio just went on air, so open the show in the intro.\n");
    }
    prompt.push_str(
        "Reply with exactly two lines and nothing else:\n\
         SONG: Artist - Title\n\
         INTRO: one or two short sentences introducing the song\n",
    );
    prompt
}

/// Split a reply into `(song_query, intro_text)`.
///
/// Accepts the `SONG:`/`INTRO:` format and falls back to "first line is the song".
pub fn parse_reply(reply: &str) -> Result<(String, String), GeneratorError> {
    let mut song = None;
    let mut intro = None;
    let mut loose = Vec::new();
    for line in reply.lines() {
        let line = clean(line);
        if line.is_empty() {
            continue;
        }
        if let Some(rest) = strip_label(&line, "SONG:") {
            song = Some(clean(rest));
        } else if let Some(rest) = strip_label(&line, "INTRO:") {
            intro = Some(clean(rest));
        } else {
            loose.push(line);
        }
    }
    let mut loose = loose.into_iter();
    let song = song
        .or_else(|| loose.next())
        .filter(|song| !song.is_empty())
        .ok_or_else(|| GeneratorError::Malformed("reply has no song".to_string()))?;
    let intro = intro.unwrap_or_else(|| loose.collect::<Vec<_>>().join(" "));
    Ok((song, intro))
}

fn strip_label<'a>(line: &'a str, label: &str) -> Option<&'a str> {
    let head = line.get(..label.len())?;
    head.eq_ignore_ascii_case(label)
        .then(|| &line[label.len()..])
}

/// Drop markdown emphasis and quotes the model likes to add.
fn clean(text: &str) -> String {
    text.replace(['*', '`'], "")
        .trim()
        .trim_matches(|c| c == '"' || c == '\'')
        .trim()
        .to_string()
}
