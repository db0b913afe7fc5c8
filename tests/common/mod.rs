use assert_cmd::Command;

pub fn runcoachd_bin() -> Command {
    #[allow(deprecated)]
    {
        Command::cargo_bin("runcoachd").expect("runcoachd test binary should build")
    }
}
