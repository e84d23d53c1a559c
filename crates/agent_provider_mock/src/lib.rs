//! Deterministic scripted implementation of the `agent_provider` contract.
//!
//! Streams a fixed command-bearing reply token by token so the dispatcher sees the
//! same partial-tag boundaries a real model produces. Used for local runs and tests.

use std::sync::atomic::Ordering;
use std::thread;
use std::time::Duration;

use agent_provider::{CancelSignal, ProviderProfile, RunEvent, RunProvider, RunRequest};

/// Stable provider identifier used for explicit startup selection.
pub const MOCK_PROVIDER_ID: &str = "mock";

/// Scripted provider replaying `chunks` as whitespace-delimited tokens.
#[derive(Debug, Clone)]
pub struct MockProvider {
    chunks: Vec<String>,
    run_delay: Duration,
    token_delay: Duration,
}

impl MockProvider {
    const RUN_DELAY_MS: u64 = 200;
    const TOKEN_DELAY_MS: u64 = 25;

    /// Creates a mock provider with caller-provided chunks and the default pacing.
    #[must_use]
    pub fn new(chunks: Vec<String>) -> Self {
        Self {
            chunks,
            run_delay: Duration::from_millis(Self::RUN_DELAY_MS),
            token_delay: Duration::from_millis(Self::TOKEN_DELAY_MS),
        }
    }

    /// Same script without any sleeping, for tests.
    #[must_use]
    pub fn instant(chunks: Vec<String>) -> Self {
        Self::new(chunks).with_delays(Duration::ZERO, Duration::ZERO)
    }

    #[must_use]
    pub fn with_delays(mut self, run_delay: Duration, token_delay: Duration) -> Self {
        self.run_delay = run_delay;
        self.token_delay = token_delay;
        self
    }

    /// Full reply text the provider streams.
    #[must_use]
    pub fn script(&self) -> String {
        self.chunks.concat()
    }

    fn pause(delay: Duration) {
        if !delay.is_zero() {
            thread::sleep(delay);
        }
    }
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new(vec![
            "I'll scaffold a small counter app for you.\n\n".to_string(),
            "<makef path=\"./package.json\"/>\n".to_string(),
            "<makef path=\"./src/main.tsx\"/>\n".to_string(),
            "<makef path=\"./src/components/Counter.tsx\"/>\n\n".to_string(),
            "<writf path=\"./package.json\">\n".to_string(),
            "{\n  \"name\": \"counter\",\n  \"private\": true,\n".to_string(),
            "  \"scripts\": { \"dev\": \"vite\" }\n}\n".to_string(),
            "</writf>\n".to_string(),
            "<writf path=\"./src/components/Counter.tsx\">\n".to_string(),
            "import { useState } from \"react\";\n\n".to_string(),
            "export function Counter() {\n".to_string(),
            "  const [count, setCount] = useState(0);\n".to_string(),
            "  return <button onClick={() => setCount(count + 1)}>{count}</button>;\n"
                .to_string(),
            "}\n".to_string(),
            "</writf>\n".to_string(),
            "<writf path=\"./src/main.tsx\">\n".to_string(),
            "import { createRoot } from \"react-dom/client\";\n".to_string(),
            "import { Counter } from \"./components/Counter\";\n\n".to_string(),
            "createRoot(document.getElementById(\"root\")!).render(<Counter />);\n".to_string(),
            "</writf>\n\n".to_string(),
            "Now installing dependencies.\n".to_string(),
            "<exe>bun install</exe>\n".to_string(),
            "The counter is ready.\n".to_string(),
        ])
    }
}

impl RunProvider for MockProvider {
    fn profile(&self) -> ProviderProfile {
        ProviderProfile {
            provider_id: MOCK_PROVIDER_ID.to_string(),
            model_id: "mock-scripted".to_string(),
        }
    }

    fn run(
        &self,
        req: RunRequest,
        cancel: CancelSignal,
        emit: &mut dyn FnMut(RunEvent),
    ) -> Result<(), String> {
        let run_id = req.run_id;

        emit(RunEvent::Started { run_id });
        Self::pause(self.run_delay);

        for chunk in &self.chunks {
            let mut pending_token = String::new();
            for ch in chunk.chars() {
                pending_token.push(ch);

                if matches!(ch, ' ' | '\n') {
                    if cancel.load(Ordering::SeqCst) {
                        emit(RunEvent::Cancelled { run_id });
                        return Ok(());
                    }
                    emit(RunEvent::Delta {
                        run_id,
                        text: std::mem::take(&mut pending_token),
                    });
                    Self::pause(self.token_delay);
                }
            }

            if !pending_token.is_empty() {
                if cancel.load(Ordering::SeqCst) {
                    emit(RunEvent::Cancelled { run_id });
                    return Ok(());
                }

                emit(RunEvent::Delta {
                    run_id,
                    text: pending_token,
                });
                Self::pause(self.token_delay);
            }
        }

        if cancel.load(Ordering::SeqCst) {
            emit(RunEvent::Cancelled { run_id });
        } else {
            emit(RunEvent::Finished { run_id });
        }

        Ok(())
    }
}
