//! Main mast executable entry point.
//!
//! # Architecture
//!
//! The executable runs the mast controller against the simulated equipment and feeds it
//! telecommands from one of two sources:
//!
//!     - A TC script, given as the only argument, executed at the timestamps of its TCs
//!     - Otherwise an interactive prompt accepting either mast commands (e.g. `dump 1`) or raw
//!       JSON TCs
//!
//! TCs are queued to an executor thread which runs them one at a time. Halts and MakeSafe are
//! executed on the reading thread as soon as they arrive, so that they preempt the command in
//! progress. Every mast command produces a response which is printed as JSON.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use color_eyre::{
    eyre::{eyre, WrapErr},
    Report,
};
use log::{debug, info, warn};
use rustyline::{error::ReadlineError, DefaultEditor};
use std::{
    env,
    path::PathBuf,
    sync::{
        mpsc::{self, Sender},
        Arc,
    },
    thread,
    time::Duration,
};
use structopt::{clap::AppSettings, StructOpt};

// Internal
use comms_if::tc::{mast::MastCmd, mast::MastResponse, Tc};
use mast_lib::{
    mast_ctrl::{MastCtrl, Params},
    params::MastExecParams,
    sim::{SimActuator, SimIrCamera},
    tc_processor,
};
use util::{
    archive::Archiver,
    host,
    logger::logger_init,
    script_interpreter::{PendingTcs, ScriptInterpreter},
    session::Session,
};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// A command typed at the prompt.
#[derive(Debug, StructOpt)]
#[structopt(
    name = "mast",
    global_settings = &[AppSettings::AllowNegativeNumbers, AppSettings::DisableVersion]
)]
struct PromptCmd {
    #[structopt(subcommand)]
    cmd: MastCmd,
}

/// Sends TCs to the executor thread, running the preempting ones straight away.
struct Dispatcher {
    ctrl: Arc<MastCtrl>,
    work_tx: Sender<Work>,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Work queued for the executor thread
enum Work {
    Tc(Tc),
    Cmd(MastCmd),
}

/// Source of telecommands
enum TcSource {
    Script(ScriptInterpreter),
    Prompt(DefaultEditor, PathBuf),
}

/// Outcome of a line typed at the prompt
enum PromptAction {
    Continue,
    Exit,
}

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

/// Executable main function, entry point.
fn main() -> Result<(), Report> {
    color_eyre::install()?;

    // ---- EARLY INITIALISATION ----

    // Initialise session
    let session = Session::new("mast_exec", "sessions").wrap_err("Failed to create the session")?;

    // Exec parameters come first as they configure the logger
    let exec_params: MastExecParams =
        util::params::load("mast_exec.toml").wrap_err("Could not load exec params")?;

    // Initialise logger
    logger_init(&exec_params.log, &session).wrap_err("Failed to initialise logging")?;

    // Log information on this execution.
    info!("Mast Executable\n");
    info!("Running on: {}", host::get_hostname());
    info!("Session directory: {:?}\n", session.session_root);

    // ---- LOAD PARAMETERS ----

    let ctrl_params: Params =
        util::params::load("mast_ctrl.toml").wrap_err("Could not load MastCtrl params")?;

    info!("Parameters loaded");

    // ---- INITIALISE TC SOURCE ----

    let args: Vec<String> = env::args().collect();
    debug!("CLI arguments: {:?}", args);

    let mut tc_source = match args.len() {
        2 => {
            info!("Loading script from \"{}\"", &args[1]);

            let si = ScriptInterpreter::new(&args[1]).wrap_err("Failed to load script")?;

            info!(
                "Loaded script lasts {:.02} s and contains {} TCs\n",
                si.get_duration(),
                si.get_num_tcs()
            );

            TcSource::Script(si)
        }
        1 => {
            info!("No script provided, commands will be read from the prompt\n");

            let mut editor = DefaultEditor::new().wrap_err("Failed to create the prompt")?;
            let history_path = session.session_root.join(&exec_params.history_file);
            if editor.load_history(&history_path).is_err() {
                debug!("No prompt history found at {:?}", history_path);
            }

            TcSource::Prompt(editor, history_path)
        }
        n => {
            return Err(eyre!(
                "Expected either zero or one argument, found {}",
                n - 1
            ))
        }
    };

    // ---- INITIALISE MODULES ----

    info!("Initialising modules...");

    let actuator = SimActuator::new(&ctrl_params, exec_params.sim_actuator);
    let camera = SimIrCamera::new(exec_params.sim_camera);
    let archiver = Archiver::from_path(&session, &ctrl_params.self_test.archive_name)
        .wrap_err("Failed to open the self test archive")?;

    let ctrl = Arc::new(
        MastCtrl::new(ctrl_params, Box::new(actuator), Box::new(camera))
            .wrap_err("Failed to initialise MastCtrl")?
            .with_self_test_archive(archiver),
    );
    info!("MastCtrl init complete");

    let (work_tx, work_rx) = mpsc::channel::<Work>();
    let executor = {
        let ctrl = ctrl.clone();
        thread::Builder::new()
            .name(String::from("mast_executor"))
            .spawn(move || {
                for work in work_rx.iter() {
                    match work {
                        Work::Tc(tc) => handle_tc(&ctrl, &tc),
                        Work::Cmd(cmd) => print_response(&tc_processor::exec_cmd(&ctrl, &cmd)),
                    }
                }
            })
            .wrap_err("Failed to start the executor thread")?
    };
    let dispatcher = Dispatcher {
        ctrl: ctrl.clone(),
        work_tx,
    };
    info!("Executor started");

    info!("Module initialisation complete\n");

    // ---- MAIN LOOP ----

    info!("Begining main loop\n");

    match tc_source {
        TcSource::Script(ref mut si) => loop {
            match si.get_pending_tcs() {
                PendingTcs::None => (),
                PendingTcs::Some(tc_vec) => {
                    for tc in tc_vec {
                        dispatcher.dispatch_tc(tc);
                    }
                }
                // Exit if end of script reached
                PendingTcs::EndOfScript => {
                    info!("End of TC script reached, stopping");
                    break;
                }
            }

            thread::sleep(Duration::from_secs_f64(exec_params.script_poll_period_s));
        },
        TcSource::Prompt(ref mut editor, ref history_path) => {
            loop {
                match editor.readline(&exec_params.prompt) {
                    Ok(line) => {
                        editor.add_history_entry(line.as_str()).ok();
                        if let PromptAction::Exit = handle_line(&dispatcher, &line) {
                            break;
                        }
                    }
                    Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => {
                        info!("Prompt closed, stopping");
                        break;
                    }
                    Err(e) => {
                        warn!("Prompt error: {}", e);
                        break;
                    }
                }
            }

            if let Err(e) = editor.save_history(history_path) {
                warn!("Could not save the prompt history: {}", e);
            }
        }
    }

    // ---- SHUTDOWN ----

    // Let the executor finish the queued commands
    drop(dispatcher);
    executor
        .join()
        .map_err(|_| eyre!("The executor thread panicked"))?;

    info!("Halting all joints");
    ctrl.halt_all_joints();

    info!("End of execution");
    session.exit();

    Ok(())
}

/// Execute a TC and print the response, if any.
fn handle_tc(ctrl: &MastCtrl, tc: &Tc) {
    if let Some(response) = tc_processor::exec(ctrl, tc) {
        print_response(&response);
    }
}

/// Handle one line typed at the prompt.
fn handle_line(dispatcher: &Dispatcher, line: &str) -> PromptAction {
    let line = line.trim();

    match line {
        "" => (),
        "exit" | "quit" => return PromptAction::Exit,
        "safe" => {
            info!("Halting all joints");
            dispatcher.ctrl.halt_all_joints();
        }
        // Raw JSON TCs
        l if l.starts_with('{') => match Tc::from_json(l) {
            Ok(tc) => dispatcher.dispatch_tc(tc),
            Err(e) => println!("Invalid TC: {}", e),
        },
        l => match PromptCmd::from_iter_safe(std::iter::once("mast").chain(l.split_whitespace())) {
            Ok(p) => dispatcher.dispatch_cmd(p.cmd),
            Err(e) => println!("{}", e.message),
        },
    }

    PromptAction::Continue
}

impl Dispatcher {
    fn dispatch_tc(&self, tc: Tc) {
        if tc_processor::preempts(&tc) {
            handle_tc(&self.ctrl, &tc);
        } else {
            self.queue(Work::Tc(tc));
        }
    }

    fn dispatch_cmd(&self, cmd: MastCmd) {
        if tc_processor::preempts_cmd(&cmd) {
            print_response(&tc_processor::exec_cmd(&self.ctrl, &cmd));
        } else {
            self.queue(Work::Cmd(cmd));
        }
    }

    fn queue(&self, work: Work) {
        if self.work_tx.send(work).is_err() {
            warn!("The executor has stopped, command dropped");
        }
    }
}

fn print_response(response: &MastResponse) {
    match serde_json::to_string_pretty(response) {
        Ok(s) => println!("{}", s),
        Err(e) => warn!("Could not serialise the response: {}", e),
    }
}
