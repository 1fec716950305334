// URScript program uploaded to the controller. It polls the RTDE input
// registers at robot rate and reports ready/busy via output_int_register_0.

/// Command words written to `input_int_register_0`.
pub const CMD_HOLD: i32 = 0;
pub const CMD_SPEED: i32 = 1;
pub const CMD_HOME: i32 = 2;
pub const CMD_EXIT: i32 = 3;

/// Values the script writes to `output_int_register_0`.
pub const SCRIPT_READY: i32 = 1;
pub const SCRIPT_BUSY: i32 = 2;

/// Velocity vector lives in `input_double_register_0..5`, acceleration in
/// `input_double_register_6`. The home command reuses registers 0..5 for the
/// target joint pose.
pub const CONTROL_SCRIPT: &str = "\
def teleop_control():
  textmsg(\"teleop control active\")
  write_output_integer_register(0, 1)
  cmd = 0
  while cmd != 3:
    cmd = read_input_integer_register(0)
    if cmd == 1:
      vel = [read_input_float_register(0), read_input_float_register(1), read_input_float_register(2), read_input_float_register(3), read_input_float_register(4), read_input_float_register(5)]
      acc = read_input_float_register(6)
      speedl(vel, acc, 0.02)
    elif cmd == 2:
      write_output_integer_register(0, 2)
      stopl(2.0)
      q = [read_input_float_register(0), read_input_float_register(1), read_input_float_register(2), read_input_float_register(3), read_input_float_register(4), read_input_float_register(5)]
      movej(q, a=1.4, v=1.05)
      write_output_integer_register(0, 1)
    else:
      speedl([0.0, 0.0, 0.0, 0.0, 0.0, 0.0], 2.0, 0.02)
    end
  end
  stopl(2.0)
  textmsg(\"teleop control finished\")
end
";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn script_literals_match_command_constants() {
        assert!(CONTROL_SCRIPT.contains(&format!("while cmd != {}:", CMD_EXIT)));
        assert!(CONTROL_SCRIPT.contains(&format!("if cmd == {}:", CMD_SPEED)));
        assert!(CONTROL_SCRIPT.contains(&format!("elif cmd == {}:", CMD_HOME)));
        assert!(CONTROL_SCRIPT.contains(&format!("write_output_integer_register(0, {})", SCRIPT_READY)));
        assert!(CONTROL_SCRIPT.contains(&format!("write_output_integer_register(0, {})", SCRIPT_BUSY)));
    }

    #[test]
    fn script_is_a_single_program() {
        assert!(CONTROL_SCRIPT.starts_with("def teleop_control():"));
        assert!(CONTROL_SCRIPT.trim_end().ends_with("end"));
    }
}
