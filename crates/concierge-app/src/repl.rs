//! Line-oriented presentation shell.
//!
//! Reads commands from stdin, forwards them to the session engine, report
//! query and voice input, and prints what changed.

use tokio::io::{AsyncBufReadExt, BufReader};

use concierge_chat::{ChatError, ReportQuery, SendOutcome, SessionEngine};
use concierge_core::{ConversationId, Role};
use concierge_voice::{VoiceInput, VoiceState};

use crate::render;

const HELP: &str = "\
Escribe un mensaje para hablar con el asistente, o usa un comando:
  /nueva              empezar una conversación nueva
  /historial          listar conversaciones anteriores
  /abrir N            cargar la conversación N del historial
  /borrar N           eliminar la conversación N del historial
  /calificar 1-5      calificar la última respuesta
  /sugerencias        ver accesos rápidos y preguntas sugeridas
  /sugerencia N       enviar la pregunta sugerida N
  /reporte CONSULTA   generar un reporte
  /dictar             iniciar o detener el dictado por voz
  /enviar             enviar el texto dictado
  /ayuda              mostrar esta ayuda
  /salir              terminar";

/// One line of user input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Send(String),
    New,
    History,
    Open(usize),
    Delete(usize),
    Rate(u8),
    Hints,
    Suggestion(usize),
    Report(String),
    Dictate,
    SendDraft,
    Help,
    Quit,
    Invalid(String),
}

impl Command {
    pub fn parse(line: &str) -> Command {
        let line = line.trim();
        let Some(rest) = line.strip_prefix('/') else {
            return Command::Send(line.to_string());
        };
        let (name, arg) = match rest.split_once(char::is_whitespace) {
            Some((name, arg)) => (name, arg.trim()),
            None => (rest, ""),
        };
        let index = |arg: &str| arg.parse::<usize>().ok().filter(|n| *n >= 1);
        match name {
            "nueva" | "new" => Command::New,
            "historial" | "history" => Command::History,
            "abrir" | "open" => index(arg)
                .map(Command::Open)
                .unwrap_or_else(|| Command::Invalid("indica el número de la conversación".into())),
            "borrar" | "delete" => index(arg)
                .map(Command::Delete)
                .unwrap_or_else(|| Command::Invalid("indica el número de la conversación".into())),
            "calificar" | "rate" => arg
                .parse::<u8>()
                .map(Command::Rate)
                .unwrap_or_else(|_| Command::Invalid("la calificación va de 1 a 5".into())),
            "sugerencias" | "hints" => Command::Hints,
            "sugerencia" | "suggest" => index(arg)
                .map(Command::Suggestion)
                .unwrap_or_else(|| Command::Invalid("indica el número de la sugerencia".into())),
            "reporte" | "report" => Command::Report(arg.to_string()),
            "dictar" | "dictate" => Command::Dictate,
            "enviar" | "send" => Command::SendDraft,
            "ayuda" | "help" => Command::Help,
            "salir" | "quit" | "exit" => Command::Quit,
            other => Command::Invalid(format!("comando desconocido: /{}", other)),
        }
    }
}

pub struct Shell {
    engine: SessionEngine,
    reports: ReportQuery,
    voice: Option<VoiceInput>,
}

impl Shell {
    pub fn new(engine: SessionEngine, reports: ReportQuery, voice: Option<VoiceInput>) -> Self {
        Self {
            engine,
            reports,
            voice,
        }
    }

    pub async fn run(mut self) -> std::io::Result<()> {
        println!("Asistente de la tienda. /ayuda para ver los comandos.");
        self.engine.open().await;
        let hints = render::hints(&self.engine.snapshot());
        if !hints.is_empty() {
            println!("{}", hints);
        }

        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Some(line) = lines.next_line().await? {
            match Command::parse(&line) {
                Command::Quit => break,
                command => self.dispatch(command).await,
            }
        }
        Ok(())
    }

    async fn dispatch(&mut self, command: Command) {
        match command {
            Command::Send(text) => {
                if text.is_empty() {
                    return;
                }
                let outcome = self.engine.send(&text).await;
                self.show_outcome(outcome);
            }
            Command::SendDraft => {
                let outcome = self.engine.send_draft().await;
                self.show_outcome(outcome);
            }
            Command::New => match self.engine.start_conversation() {
                Ok(()) => {
                    println!("Nueva conversación.");
                    let hints = render::hints(&self.engine.snapshot());
                    if !hints.is_empty() {
                        println!("{}", hints);
                    }
                }
                Err(e) => println!("{}", e),
            },
            Command::History => {
                self.engine.refresh_conversations().await;
                println!("{}", render::conversations(&self.engine.snapshot().conversations));
            }
            Command::Open(n) => {
                let Some(id) = self.conversation_at(n).await else {
                    println!("No existe la conversación {}.", n);
                    return;
                };
                match self.engine.load_conversation(&id).await {
                    Ok(()) => {
                        for m in &self.engine.snapshot().messages {
                            println!("{}", render::message(m));
                        }
                    }
                    Err(e) => println!("No se pudo cargar la conversación: {}", e),
                }
            }
            Command::Delete(n) => {
                let Some(id) = self.conversation_at(n).await else {
                    println!("No existe la conversación {}.", n);
                    return;
                };
                match self.engine.delete_conversation(&id).await {
                    Ok(()) => println!("Conversación eliminada."),
                    Err(e) => println!("No se pudo eliminar la conversación: {}", e),
                }
            }
            Command::Rate(value) => {
                let snapshot = self.engine.snapshot();
                let last = snapshot
                    .messages
                    .iter()
                    .rev()
                    .find(|m| m.role == Role::Assistant && m.id.is_durable());
                match last {
                    Some(m) => match self.engine.rate(&m.id, value) {
                        Ok(()) => println!("¡Gracias por tu calificación!"),
                        Err(e) => println!("{}", e),
                    },
                    None => println!("No hay respuestas para calificar."),
                }
            }
            Command::Hints => {
                self.engine.open().await;
                let hints = render::hints(&self.engine.snapshot());
                if hints.is_empty() {
                    println!("No hay sugerencias disponibles.");
                } else {
                    println!("{}", hints);
                }
            }
            Command::Suggestion(n) => {
                let suggestion = self.engine.snapshot().suggestions.get(n - 1).cloned();
                match suggestion {
                    Some(s) => {
                        println!("tú: {}", s);
                        let outcome = self.engine.send_suggestion(&s).await;
                        self.show_outcome(outcome);
                    }
                    None => println!("No existe la sugerencia {}.", n),
                }
            }
            Command::Report(query) => {
                let result = if query.is_empty() {
                    self.reports.generate_draft().await
                } else {
                    self.reports.generate(&query).await
                };
                match result {
                    Ok(report) => println!("{}", render::report(&report)),
                    Err(_) => {
                        if let Some(error) = self.reports.snapshot().error {
                            println!("{}", error);
                        }
                        self.reports.clear_error();
                    }
                }
            }
            Command::Dictate => {
                let Some(voice) = self.voice.as_mut() else {
                    println!("El dictado por voz está desactivado.");
                    return;
                };
                voice.toggle().await;
                match voice.state() {
                    VoiceState::Listening => println!("Escuchando..."),
                    VoiceState::Error => {
                        if let Some(message) = voice.error_message() {
                            println!("{}", message);
                        }
                        voice.dismiss_error();
                    }
                    VoiceState::Idle => println!("Dictado detenido."),
                }
            }
            Command::Help => println!("{}", HELP),
            Command::Invalid(reason) => println!("{}", reason),
            Command::Quit => {}
        }
    }

    /// Conversation `n` of the history list, fetching the list if needed.
    async fn conversation_at(&self, n: usize) -> Option<ConversationId> {
        if self.engine.snapshot().conversations.is_empty() {
            self.engine.refresh_conversations().await;
        }
        self.engine
            .snapshot()
            .conversations
            .get(n - 1)
            .map(|c| c.id.clone())
    }

    fn show_outcome(&self, outcome: SendOutcome) {
        match outcome {
            SendOutcome::Replied { message_id, .. } => {
                if let Some(m) = self
                    .engine
                    .snapshot()
                    .messages
                    .iter()
                    .find(|m| m.id == message_id)
                {
                    println!("{}", render::message(m));
                }
            }
            SendOutcome::Failed { .. } => {
                if let Some(m) = self.engine.snapshot().messages.last() {
                    println!("{}", render::message(m));
                }
            }
            SendOutcome::Ignored(ChatError::MessageTooLong(max)) => {
                println!("El mensaje supera los {} caracteres.", max);
            }
            SendOutcome::Ignored(ChatError::SendInFlight) => {
                println!("Espera la respuesta anterior.");
            }
            SendOutcome::Ignored(ChatError::SwitchInFlight) => {
                println!("Espera a que termine de cargar o eliminar la conversación.");
            }
            SendOutcome::Ignored(_) | SendOutcome::Superseded => {}
        }
    }
}
