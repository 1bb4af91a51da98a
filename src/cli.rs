//! Command line parsing
//!
//! `embed-probe <widget> <method>`. Anything else is a usage error, reported
//! on stdout with exit status 1 before any X connection is opened.

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Container widget kind hosting the foreign window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WidgetKind {
    /// Passive drawing surface
    DrawingArea,
    /// Input-receiving box
    EventBox,
    /// XEMBED socket
    Socket,
}

impl WidgetKind {
    pub const ALL: [WidgetKind; 3] = [Self::DrawingArea, Self::EventBox, Self::Socket];

    pub fn name(self) -> &'static str {
        match self {
            Self::DrawingArea => "drawingarea",
            Self::EventBox => "eventbox",
            Self::Socket => "socket",
        }
    }
}

impl FromStr for WidgetKind {
    type Err = UsageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "drawingarea" => Ok(Self::DrawingArea),
            "eventbox" => Ok(Self::EventBox),
            "socket" => Ok(Self::Socket),
            other => Err(UsageError::UnknownWidget(other.to_string())),
        }
    }
}

impl fmt::Display for WidgetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// How the emulator window ends up inside the container
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbedMethod {
    /// Emulator reparents itself into `HATARI_PARENT_WIN`
    Previous,
    /// SDL draws into `SDL_WINDOWID`
    Sdl,
    /// We find the emulator window and reparent it ourselves
    Reparent,
}

impl EmbedMethod {
    pub const ALL: [EmbedMethod; 3] = [Self::Previous, Self::Sdl, Self::Reparent];

    pub fn name(self) -> &'static str {
        match self {
            Self::Previous => "previous",
            Self::Sdl => "sdl",
            Self::Reparent => "reparent",
        }
    }
}

impl FromStr for EmbedMethod {
    type Err = UsageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "previous" => Ok(Self::Previous),
            "sdl" => Ok(Self::Sdl),
            "reparent" => Ok(Self::Reparent),
            other => Err(UsageError::UnknownMethod(other.to_string())),
        }
    }
}

impl fmt::Display for EmbedMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum UsageError {
    #[error("wrong number of arguments")]
    WrongArgCount,
    #[error("unknown <method> '{0}'")]
    UnknownMethod(String),
    #[error("unknown <widget> '{0}'")]
    UnknownWidget(String),
}

/// Startup selection, immutable once parsed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Options {
    pub widget: WidgetKind,
    pub method: EmbedMethod,
}

impl Options {
    /// Parse the arguments following the program name.
    ///
    /// The method is validated before the widget.
    pub fn parse<I, S>(args: I) -> Result<Self, UsageError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let args: Vec<S> = args.into_iter().collect();
        if args.len() != 2 {
            return Err(UsageError::WrongArgCount);
        }
        let method = args[1].as_ref().parse()?;
        let widget = args[0].as_ref().parse()?;
        Ok(Self { widget, method })
    }

    /// What this combination has been seen to do on real desktops
    pub fn known_quirk(self) -> Option<&'static str> {
        match (self.method, self.widget) {
            (EmbedMethod::Sdl, _) => {
                Some("SDL loses mouse, key and expose events even though its window receives them")
            }
            (EmbedMethod::Reparent, WidgetKind::EventBox) => {
                Some("the window tends to land under a root-level window instead of the event box")
            }
            (EmbedMethod::Reparent, WidgetKind::Socket) => {
                Some("the window tends to get reparented back to where it was")
            }
            _ => None,
        }
    }
}

/// Usage text followed by the error, as printed on stdout
pub fn usage(program: &str, error: &UsageError) -> String {
    let name = program.rsplit('/').next().unwrap_or(program);
    let widgets: Vec<&str> = WidgetKind::ALL.iter().map(|w| w.name()).collect();
    let methods: Vec<&str> = EmbedMethod::ALL.iter().map(|m| m.name()).collect();
    format!(
        "\nusage: {name} <widget> <embed method>\n\n\
         Opens window with given <widget>, runs the emulator and tries to embed it\n\
         with given <method>\n\n\
         <widget> can be <{}>\n\
         <method> can be <{}>\n\n\
         ERROR: {error}\n",
        widgets.join("|"),
        methods.join("|"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_combinations_parse() {
        for widget in WidgetKind::ALL {
            for method in EmbedMethod::ALL {
                let opts = Options::parse([widget.name(), method.name()]).unwrap();
                assert_eq!(opts.widget, widget);
                assert_eq!(opts.method, method);
            }
        }
    }

    #[test]
    fn test_invalid_method_rejected_for_every_widget() {
        for widget in WidgetKind::ALL {
            let err = Options::parse([widget.name(), "xembed"]).unwrap_err();
            assert_eq!(err, UsageError::UnknownMethod("xembed".into()));
        }
    }

    #[test]
    fn test_invalid_widget_rejected_for_every_method() {
        for method in EmbedMethod::ALL {
            let err = Options::parse(["gtkplug", method.name()]).unwrap_err();
            assert_eq!(err, UsageError::UnknownWidget("gtkplug".into()));
        }
    }

    #[test]
    fn test_method_checked_before_widget() {
        let err = Options::parse(["bogus", "alsobogus"]).unwrap_err();
        assert!(matches!(err, UsageError::UnknownMethod(_)));
    }

    #[test]
    fn test_wrong_arg_count() {
        assert_eq!(Options::parse(Vec::<&str>::new()), Err(UsageError::WrongArgCount));
        assert_eq!(Options::parse(["socket"]), Err(UsageError::WrongArgCount));
        assert_eq!(
            Options::parse(["socket", "sdl", "extra"]),
            Err(UsageError::WrongArgCount)
        );
    }

    #[test]
    fn test_known_quirks() {
        let opts = |widget, method| Options { widget, method };
        assert!(opts(WidgetKind::Socket, EmbedMethod::Previous).known_quirk().is_none());
        assert!(opts(WidgetKind::DrawingArea, EmbedMethod::Sdl).known_quirk().is_some());
        assert!(opts(WidgetKind::Socket, EmbedMethod::Reparent).known_quirk().is_some());
    }

    #[test]
    fn test_usage_mentions_error_and_basename() {
        let text = usage("/usr/bin/embed-probe", &UsageError::UnknownWidget("x".into()));
        assert!(text.contains("usage: embed-probe <widget> <embed method>"));
        assert!(text.contains("ERROR: unknown <widget> 'x'"));
        assert!(text.contains("<drawingarea|eventbox|socket>"));
        assert!(text.contains("<previous|sdl|reparent>"));
    }
}
