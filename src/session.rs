use crate::history::{History, Turn};
use crate::profile::Profile;
use crate::provider::{ChatRequest, DeltaStream, Provider};
use crate::spinner::Spinner;
use crossterm::style::Stylize;
use std::future::Future;
use std::io::{BufRead, Write};
use tokio::sync::mpsc;
use tokio_stream::StreamExt;

const EXIT_TOKEN: &str = "exit";

/// What the loop does after handling one input line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Continue,
    Close,
}

/// How one request/response exchange ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exchange {
    Completed,
    Cancelled,
    Failed,
}

/// Opens the writer a spinner draws on.
type ProgressSink = Box<dyn Fn() -> Box<dyn Write + Send>>;

/// One interactive chat session against a fixed profile.
pub struct Session<'a, P: ?Sized> {
    provider: &'a P,
    profile: Profile,
    history: History,
    progress: Option<ProgressSink>,
}

impl<'a, P> Session<'a, P>
where
    P: Provider + ?Sized,
{
    pub fn new(provider: &'a P, profile: Profile, max_history: usize) -> Self {
        Self {
            provider,
            profile,
            history: History::new(max_history),
            progress: None,
        }
    }

    /// Show a spinner on stderr while waiting for the response headers.
    pub fn with_progress(self, on: bool) -> Self {
        if on {
            self.with_progress_on(std::io::stderr)
        } else {
            self
        }
    }

    /// Like [`Session::with_progress`], drawing on writers made by `sink`.
    pub fn with_progress_on<S, W>(mut self, sink: S) -> Self
    where
        S: Fn() -> W + 'static,
        W: Write + Send + 'static,
    {
        self.progress = Some(Box::new(move || Box::new(sink()) as Box<dyn Write + Send>));
        self
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    /// Run until `exit`, end of input, or an interrupt at the prompt.
    ///
    /// `interrupt` is called to create a fresh future for each waiting point:
    /// at the prompt it closes the session, while streaming it cancels the
    /// response.
    pub async fn run<W, F, Fut>(
        &mut self,
        mut input: mpsc::UnboundedReceiver<String>,
        out: &mut W,
        mut interrupt: F,
    ) -> anyhow::Result<()>
    where
        W: Write,
        F: FnMut() -> Fut,
        Fut: Future<Output = ()>,
    {
        writeln!(
            out,
            "{}",
            format!(
                "Chatting with {} ({}). Type `exit` to quit, Ctrl+C cancels a reply.",
                self.profile.name, self.profile.model_id
            )
            .cyan()
        )?;

        loop {
            write!(out, "{}", "You: ".blue().bold())?;
            out.flush()?;

            let line = tokio::select! {
                biased;
                line = input.recv() => line,
                _ = interrupt() => None,
            };
            let Some(line) = line else {
                writeln!(out)?;
                break;
            };

            if self.handle_line(&line, out, &mut interrupt).await? == Step::Close {
                break;
            }
        }

        // Releases the reader side; the input thread stops on its next send.
        input.close();
        tracing::debug!(turns = self.history.len(), window = self.history.max(), "session closed");
        Ok(())
    }

    pub async fn handle_line<W, F, Fut>(
        &mut self,
        line: &str,
        out: &mut W,
        interrupt: &mut F,
    ) -> anyhow::Result<Step>
    where
        W: Write,
        F: FnMut() -> Fut,
        Fut: Future<Output = ()>,
    {
        let text = line.trim();
        if text.is_empty() {
            return Ok(Step::Continue);
        }
        if text.eq_ignore_ascii_case(EXIT_TOKEN) {
            return Ok(Step::Close);
        }

        self.history.push(Turn::user(text));
        let outcome = self.exchange(out, interrupt).await?;
        tracing::debug!(?outcome, turns = self.history.len(), "exchange finished");
        Ok(Step::Continue)
    }

    async fn exchange<W, F, Fut>(&mut self, out: &mut W, interrupt: &mut F) -> anyhow::Result<Exchange>
    where
        W: Write,
        F: FnMut() -> Fut,
        Fut: Future<Output = ()>,
    {
        let req = ChatRequest {
            profile: self.profile.clone(),
            messages: self.history.to_vec(),
        };

        let spinner = self
            .progress
            .as_ref()
            .map(|sink| Spinner::start_on(sink(), "waiting for response"));
        let opened = tokio::select! {
            biased;
            opened = self.provider.stream_chat(req) => Some(opened),
            _ = interrupt() => None,
        };
        if let Some(spinner) = spinner {
            spinner.finish().await;
        }

        let Some(opened) = opened else {
            tracing::debug!("request cancelled before a response arrived");
            writeln!(out, "{}", "[request cancelled]".yellow())?;
            writeln!(out)?;
            return Ok(Exchange::Cancelled);
        };

        let stream = match opened {
            Ok(stream) => stream,
            Err(e) => {
                tracing::warn!(provider = self.provider.name(), error = %e, "chat request failed");
                writeln!(out, "{} {e}", "Request failed:".red().bold())?;
                writeln!(out)?;
                return Ok(Exchange::Failed);
            }
        };

        write!(out, "{}", "Assistant: ".green().bold())?;
        out.flush()?;
        self.stream_reply(stream, out, interrupt()).await
    }

    /// Render deltas until the stream ends or `cancel` resolves.
    async fn stream_reply<W, C>(
        &mut self,
        mut stream: DeltaStream,
        out: &mut W,
        cancel: C,
    ) -> anyhow::Result<Exchange>
    where
        W: Write,
        C: Future<Output = ()>,
    {
        tokio::pin!(cancel);
        let mut reply = String::new();

        loop {
            tokio::select! {
                biased;
                item = stream.next() => match item {
                    Some(Ok(delta)) => {
                        if reply.is_empty() && delta.text.trim().is_empty() {
                            continue;
                        }
                        write!(out, "{}", delta.text)?;
                        out.flush()?;
                        reply.push_str(&delta.text);
                    }
                    Some(Err(e)) => {
                        tracing::warn!(error = %e, received = reply.len(), "response stream failed");
                        writeln!(out)?;
                        writeln!(out, "{} {e}", "Response failed:".red().bold())?;
                        writeln!(out)?;
                        return Ok(Exchange::Failed);
                    }
                    None => break,
                },
                _ = &mut cancel => {
                    tracing::debug!(received = reply.len(), "response cancelled");
                    writeln!(out)?;
                    writeln!(out, "{}", "[response cancelled]".yellow())?;
                    writeln!(out)?;
                    return Ok(Exchange::Cancelled);
                }
            }
        }

        writeln!(out)?;
        writeln!(out)?;
        self.history.push(Turn::assistant(reply));
        Ok(Exchange::Completed)
    }
}

/// Read stdin lines on a dedicated thread so a blocked read never holds up
/// runtime shutdown. The channel closes at end of input.
pub fn spawn_stdin_reader() -> mpsc::UnboundedReceiver<String> {
    let (tx, rx) = mpsc::unbounded_channel();
    std::thread::spawn(move || forward_lines(std::io::stdin().lock(), &tx));
    rx
}

/// Forward lines until end of input; invalid UTF-8 is replaced, not fatal.
fn forward_lines<R: BufRead>(mut reader: R, tx: &mpsc::UnboundedSender<String>) {
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf) {
            Ok(0) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf);
                let text = line.trim_end_matches(['\n', '\r']).to_string();
                if tx.send(text).is_err() {
                    break;
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to read stdin");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::Role;
    use crate::provider::stub::{Reply, StubProvider};
    use crate::spinner::tests::SharedBuf;
    use std::time::Duration;

    fn profile() -> Profile {
        Profile {
            name: "p1".to_string(),
            model_id: "m-1".to_string(),
            credential: "sk-test".to_string(),
            endpoint_base: "https://x/v1".to_string(),
        }
    }

    fn input(lines: &[&str]) -> mpsc::UnboundedReceiver<String> {
        let (tx, rx) = mpsc::unbounded_channel();
        for l in lines {
            tx.send(l.to_string()).expect("send");
        }
        rx
    }

    fn never() -> std::future::Pending<()> {
        std::future::pending()
    }

    fn text(out: &[u8]) -> String {
        String::from_utf8_lossy(out).to_string()
    }

    #[tokio::test]
    async fn end_to_end_exchange_renders_and_records() {
        let provider = StubProvider::new(vec![Reply::Deltas(vec!["He", "llo"])]);
        let mut session = Session::new(&provider, profile(), 2);
        let mut out = Vec::new();

        session
            .run(input(&["hi", "exit"]), &mut out, never)
            .await
            .expect("run");

        assert!(text(&out).contains("Hello"));
        assert_eq!(
            session.history().to_vec(),
            vec![Turn::user("hi"), Turn::assistant("Hello")]
        );

        let reqs = provider.requests();
        assert_eq!(reqs.len(), 1);
        assert_eq!(reqs[0].profile.model_id, "m-1");
        assert_eq!(reqs[0].messages, vec![Turn::user("hi")]);
    }

    #[tokio::test]
    async fn blank_input_is_a_no_op() {
        let provider = StubProvider::new(Vec::new());
        let mut session = Session::new(&provider, profile(), 4);
        let mut out = Vec::new();

        for line in ["", "   ", "\t"] {
            let step = session
                .handle_line(line, &mut out, &mut never)
                .await
                .expect("handle");
            assert_eq!(step, Step::Continue);
            assert_eq!(session.history().len(), 0);
        }
        assert!(provider.requests().is_empty());
    }

    #[tokio::test]
    async fn exit_is_case_insensitive() {
        let provider = StubProvider::new(Vec::new());
        let mut session = Session::new(&provider, profile(), 4);
        let mut out = Vec::new();

        for line in ["exit", "EXIT", " Exit "] {
            let step = session
                .handle_line(line, &mut out, &mut never)
                .await
                .expect("handle");
            assert_eq!(step, Step::Close);
        }
        assert_eq!(session.history().len(), 0);
    }

    #[tokio::test]
    async fn end_of_input_closes_session() {
        let provider = StubProvider::new(Vec::new());
        let mut session = Session::new(&provider, profile(), 4);
        let mut out = Vec::new();

        session.run(input(&[]), &mut out, never).await.expect("run");
        assert!(provider.requests().is_empty());
    }

    #[tokio::test]
    async fn cancellation_discards_partial_reply() {
        let provider = StubProvider::new(vec![
            Reply::Deltas(vec!["first"]),
            Reply::Stall(vec!["par", "tial"]),
            Reply::Deltas(vec!["ok"]),
        ]);
        let mut session = Session::new(&provider, profile(), 10);
        let mut out = Vec::new();
        let mut cancel = || tokio::time::sleep(Duration::from_millis(50));

        session.handle_line("one", &mut out, &mut cancel).await.expect("one");
        session.handle_line("two", &mut out, &mut cancel).await.expect("two");

        let rendered = text(&out);
        assert!(rendered.contains("partial"));
        assert!(rendered.contains("[response cancelled]"));
        assert!(provider.stream_dropped());
        assert_eq!(
            session.history().to_vec(),
            vec![Turn::user("one"), Turn::assistant("first"), Turn::user("two")]
        );

        session.handle_line("three", &mut out, &mut cancel).await.expect("three");
        let reqs = provider.requests();
        assert_eq!(
            reqs[2].messages,
            vec![
                Turn::user("one"),
                Turn::assistant("first"),
                Turn::user("two"),
                Turn::user("three"),
            ]
        );
    }

    #[tokio::test]
    async fn transport_failure_keeps_user_turn_and_continues() {
        let provider = StubProvider::new(vec![Reply::Fail("connection refused"), Reply::Deltas(vec!["fine"])]);
        let mut session = Session::new(&provider, profile(), 4);
        let mut out = Vec::new();

        session
            .run(input(&["hi", "again", "exit"]), &mut out, never)
            .await
            .expect("run");

        let rendered = text(&out);
        assert!(rendered.contains("connection refused"));
        assert_eq!(
            session.history().to_vec(),
            vec![Turn::user("hi"), Turn::user("again"), Turn::assistant("fine")]
        );
    }

    #[tokio::test]
    async fn leading_blank_deltas_are_suppressed() {
        let provider = StubProvider::new(vec![Reply::Deltas(vec!["\n", "  ", "Hi", "\n", "there"])]);
        let mut session = Session::new(&provider, profile(), 2);
        let mut out = Vec::new();

        session.handle_line("q", &mut out, &mut never).await.expect("q");

        let rendered = text(&out);
        let label_end = rendered.find("Assistant: ").expect("label") + "Assistant: ".len();
        assert!(rendered[label_end..].contains("Hi\nthere"));
        assert_eq!(session.history().to_vec()[1], Turn::assistant("Hi\nthere"));
    }

    #[tokio::test]
    async fn empty_stream_completes_empty_assistant_turn() {
        let provider = StubProvider::new(vec![Reply::Deltas(Vec::new())]);
        let mut session = Session::new(&provider, profile(), 2);
        let mut out = Vec::new();

        session.handle_line("q", &mut out, &mut never).await.expect("q");
        let turns = session.history().to_vec();
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[1].role, Role::Assistant);
        assert!(turns[1].content.is_empty());
    }

    #[tokio::test]
    async fn window_of_one_evicts_by_recency() {
        let provider = StubProvider::new(vec![Reply::Deltas(vec!["a1"]), Reply::Deltas(vec!["a2"])]);
        let mut session = Session::new(&provider, profile(), 1);
        let mut out = Vec::new();

        session.handle_line("q1", &mut out, &mut never).await.expect("q1");
        session.handle_line("q2", &mut out, &mut never).await.expect("q2");

        assert_eq!(session.history().to_vec(), vec![Turn::assistant("a2")]);
        // Only the newest user turn is sent with a window of one.
        assert_eq!(provider.requests()[1].messages, vec![Turn::user("q2")]);
    }

    #[tokio::test]
    async fn interrupt_while_waiting_for_headers_cancels_request() {
        let provider = StubProvider::new(vec![Reply::Hang]);
        let mut session = Session::new(&provider, profile(), 4);
        let mut out = Vec::new();
        let mut interrupt = || async {};

        let step = tokio::time::timeout(
            Duration::from_secs(2),
            session.handle_line("hi", &mut out, &mut interrupt),
        )
        .await
        .expect("exchange should not hang")
        .expect("handle");

        assert_eq!(step, Step::Continue);
        assert!(text(&out).contains("[request cancelled]"));
        assert_eq!(session.history().to_vec(), vec![Turn::user("hi")]);
    }

    #[tokio::test]
    async fn interrupt_at_prompt_closes_session() {
        let provider = StubProvider::new(Vec::new());
        let mut session = Session::new(&provider, profile(), 4);
        let mut out = Vec::new();
        // Sender stays alive, so input is pending rather than at its end.
        let (_tx, rx) = mpsc::unbounded_channel::<String>();

        tokio::time::timeout(
            Duration::from_secs(2),
            session.run(rx, &mut out, || tokio::time::sleep(Duration::from_millis(20))),
        )
        .await
        .expect("session should close")
        .expect("run");

        assert!(provider.requests().is_empty());
        assert_eq!(session.history().len(), 0);
    }

    #[tokio::test]
    async fn spinner_line_is_cleared_after_failure_and_success() {
        let buf = SharedBuf::default();
        let provider = StubProvider::new(vec![Reply::Fail("boom"), Reply::Deltas(vec!["ok"])]);
        let sink = buf.clone();
        let mut session = Session::new(&provider, profile(), 4).with_progress_on(move || sink.clone());
        let mut out = Vec::new();
        let clear = "\u{1b}[2K";

        session.handle_line("one", &mut out, &mut never).await.expect("one");
        let after_failure = buf.contents();
        assert!(after_failure.ends_with(clear), "spinner left on screen: {after_failure:?}");

        session.handle_line("two", &mut out, &mut never).await.expect("two");
        let after_success = buf.contents();
        assert!(after_success.len() > after_failure.len());
        assert!(after_success.ends_with(clear), "spinner left on screen: {after_success:?}");

        // Spinner frames never leak into the reply output.
        assert!(!text(&out).contains("waiting for response"));
        assert_eq!(session.history().to_vec()[2], Turn::assistant("ok"));
    }

    #[test]
    fn input_reader_survives_invalid_utf8() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let data: &[u8] = b"hi\n\xff\xfeok\r\nlast";
        forward_lines(std::io::Cursor::new(data), &tx);
        drop(tx);

        let mut lines = Vec::new();
        while let Ok(line) = rx.try_recv() {
            lines.push(line);
        }
        assert_eq!(
            lines,
            vec![
                "hi".to_string(),
                "\u{FFFD}\u{FFFD}ok".to_string(),
                "last".to_string()
            ]
        );
    }
}
