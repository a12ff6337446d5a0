//! Minimal IRC line parsing and command building (RFC 1459 framing).

/// A parsed IRC line: `[:prefix] COMMAND [params...] [:trailing]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IrcLine {
    pub prefix: Option<String>,
    pub command: String,
    /// Parameters, with the trailing parameter (if any) last
    pub params: Vec<String>,
}

impl IrcLine {
    /// Parse one line without its CRLF. Returns `None` for blank or
    /// malformed lines.
    pub fn parse(line: &str) -> Option<Self> {
        let mut rest = line.trim_end_matches(['\r', '\n']);
        if rest.trim().is_empty() {
            return None;
        }

        let prefix = if let Some(stripped) = rest.strip_prefix(':') {
            let (prefix, tail) = stripped.split_once(' ')?;
            rest = tail;
            Some(prefix.to_string())
        } else {
            None
        };

        let rest = rest.trim_start_matches(' ');
        let (head, trailing) = match rest.split_once(" :") {
            Some((head, trailing)) => (head, Some(trailing)),
            None => match rest.strip_prefix(':') {
                Some(trailing) => ("", Some(trailing)),
                None => (rest, None),
            },
        };

        let mut words = head.split(' ').filter(|w| !w.is_empty());
        let command = words.next()?.to_ascii_uppercase();
        let mut params: Vec<String> = words.map(str::to_string).collect();
        if let Some(trailing) = trailing {
            params.push(trailing.to_string());
        }

        Some(Self {
            prefix,
            command,
            params,
        })
    }

    /// Nick part of a `nick!user@host` prefix.
    pub fn source_nick(&self) -> Option<&str> {
        let prefix = self.prefix.as_deref()?;
        let nick = prefix.split(['!', '@']).next().unwrap_or(prefix);
        (!nick.is_empty()).then_some(nick)
    }

    /// Last parameter, which carries the message text for PRIVMSG.
    pub fn trailing(&self) -> Option<&str> {
        self.params.last().map(String::as_str)
    }

    pub fn param(&self, index: usize) -> Option<&str> {
        self.params.get(index).map(String::as_str)
    }
}

/// Drop CR and LF so an argument cannot start a second command.
fn clean_arg(arg: &str) -> String {
    arg.replace(['\r', '\n'], " ")
}

pub fn nick(nick: &str) -> String {
    format!("NICK {}\r\n", clean_arg(nick))
}

pub fn user(username: &str, real_name: &str) -> String {
    format!("USER {} 0 * :{}\r\n", clean_arg(username), clean_arg(real_name))
}

pub fn join(channel: &str) -> String {
    format!("JOIN {}\r\n", clean_arg(channel))
}

pub fn privmsg(target: &str, text: &str) -> String {
    format!("PRIVMSG {} :{}\r\n", clean_arg(target), clean_arg(text))
}

pub fn pong(token: &str) -> String {
    format!("PONG :{}\r\n", clean_arg(token))
}

pub fn quit(reason: &str) -> String {
    format!("QUIT :{}\r\n", clean_arg(reason))
}
