//! Prompt templates for every strategy.
//!
//! Templates that embed the tool listing are rendered once, when an engine
//! is constructed.

use stratagem_core::tool::ToolRegistry;

pub const COT_FEW_SHOT: &str = "\
Answer the question by reasoning step by step. Finish with a line of the form \"The answer is X.\"

Q: There are 15 trees in the grove. Grove workers will plant trees today. After they are done, there will be 21 trees. How many trees did the workers plant today?
A: There are 15 trees originally. Then there were 21 trees after some more were planted. So there must have been 21 - 15 = 6. The answer is 6.

Q: If there are 3 cars in the parking lot and 2 more cars arrive, how many cars are in the parking lot?
A: There are originally 3 cars. 2 more cars arrive. 3 + 2 = 5. The answer is 5.

Q: Which country has the larger population, Canada or Australia?
A: Canada has roughly 40 million people. Australia has roughly 27 million people. 40 million is more than 27 million. The answer is Canada.

Q: Olivia has $23. She bought five bagels for $3 each. How much money does she have left?
A: Olivia had 23 dollars. 5 bagels for 3 dollars each will be 5 x 3 = 15 dollars. So she has 23 - 15 dollars left. 23 - 15 is 8. The answer is 8.";

pub const COT_ZERO_SHOT: &str = "\
Answer the question. Let's think step by step, then finish with a line of the form \"The answer is X.\"";

pub fn cot_question(question: &str) -> String {
    format!("Q: {question}\nA:")
}

pub const COT_SYNTHESIS: &str = "\
You are given several independent reasoning paths that answer the same open-ended question. \
Write one final answer that merges the complementary ideas, notes where the paths agree, \
and leaves out weak or contradictory content. Reply with the final answer only.";

pub fn cot_synthesis_request(question: &str, paths: &[String]) -> String {
    let listing = paths
        .iter()
        .enumerate()
        .map(|(i, p)| format!("--- Path {} ---\n{}", i + 1, p.trim()))
        .collect::<Vec<_>>()
        .join("\n\n");
    format!("Question: {question}\n\n{listing}")
}

pub const CLASSIFIER_SYSTEM: &str = "\
Classify the user's question. Reply with exactly one word: \"factual\" if it has a single short, \
verifiable answer (a fact, number, name or date), or \"open-ended\" if it asks for plans, advice, \
opinions, creative writing or an explanation with many valid answers.";

pub const CANONICALIZE_SYSTEM: &str = "\
You group answers that mean the same thing. For each numbered answer, give a short canonical form; \
answers that mean the same thing must get exactly the same canonical form. \
Reply with one line per answer in the exact format: N -> canonical form";

pub fn canonicalize_request(answers: &[String]) -> String {
    answers
        .iter()
        .enumerate()
        .map(|(i, a)| format!("{}. {}", i + 1, a))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn react_system(tools: &ToolRegistry) -> String {
    format!(
        "\
You run in a loop of Thought, Action, PAUSE, Observation.
Use Thought to describe your reasoning about the question.
Use Action to run one of the available tools, then return PAUSE.
Observation will be the result of running that action.

Reply in exactly one of these two shapes:

Thought: <your reasoning>
Action: <tool>: <input>
PAUSE

or, once you know the answer:

Thought: <your reasoning>
Answer: <the final answer>

Available tools:
{}

Example session:

Question: What is the capital of France?
Thought: I should look up France.
Action: wikipedia: France
PAUSE

You will be called again with this:

Observation: France is a country. The capital is Paris.

You then output:

Thought: The capital of France is Paris.
Answer: Paris",
        tools.descriptions()
    )
}

pub const REACT_NUDGE: &str = "\
Your reply did not follow the required format. Reply with either
Thought: <reasoning>
Action: <tool>: <input>
PAUSE
or
Thought: <reasoning>
Answer: <the final answer>";

pub fn observation(result: &str) -> String {
    format!("Observation: {result}")
}

pub const REWOO_PLANNER: &str = "\
For the following task, make plans that can solve the problem step by step. For each plan, indicate \
which external tool together with tool input to retrieve evidence. You can store the evidence into a \
variable #E that can be called by later tools. (Plan, #E1, Plan, #E2, Plan, ...)

Tools can be one of the following:
(1) wikipedia[input]: Searches Wikipedia for the input keywords and returns a summary and snippets. Useful for facts about people, places, things and events.
(2) search[input]: Searches the web for the input query. Useful for recent or very specific information.
(3) calculate[input]: Evaluates an arithmetic expression made of numbers and + - * / % ( ). The input must be the expression only.
(4) current_datetime[input]: Returns the current date and time. Input is ignored.
(5) LLM[input]: A pretrained language model like yourself. Useful when you need to act with general world knowledge and common sense, or to extract a value from earlier evidence. Prioritize it when you are confident in solving the problem yourself.

For example,
Task: Thomas, Toby, and Rebecca worked a total of 157 hours in one week. Thomas worked x hours. Toby worked 10 hours less than twice what Thomas worked, and Rebecca worked 8 hours less than Toby. How many hours did Rebecca work?
Plan: Given Thomas worked x hours, translate the problem into algebraic expressions and solve with the LLM. #E1 = LLM[Solve x + (2x - 10) + ((2x - 10) - 8) = 157]
Plan: Find out the number of hours Thomas worked. #E2 = LLM[What is x, given #E1]
Plan: Calculate the number of hours Rebecca worked. #E3 = calculate[(2 * #E2 - 10) - 8]

Task: What is the height of the Eiffel Tower in feet?
Plan: Look up the height of the Eiffel Tower. #E1 = wikipedia[Eiffel Tower]
Plan: Extract the height in metres from the evidence. #E2 = LLM[What is the height of the Eiffel Tower in metres, as a number only, given: #E1]
Plan: Convert metres to feet. #E3 = calculate[#E2 * 3.28084]

Begin! Describe your plans with rich details. Each Plan should be followed by only one #E.";

pub fn rewoo_task(question: &str) -> String {
    format!("Task: {question}")
}

pub const REWOO_SOLVER: &str = "\
Solve the following task or problem. To solve the problem, we have made step-by-step plans and \
retrieved corresponding evidence for each plan. Use them with caution since long evidence might \
contain irrelevant information.";

pub fn rewoo_solve_request(question: &str, transcript: &str) -> String {
    format!(
        "{transcript}\n\nNow solve the question or task according to the provided evidence above. \
Respond with the answer directly with no extra words.\n\nTask: {question}\nResponse:"
    )
}

pub const PLANNER_SYSTEM: &str = "\
For the given objective, come up with a simple step by step plan. The plan should involve individual \
tasks that, if executed correctly, will yield the correct answer. Do not add superfluous steps. The \
result of the final step should be the final answer. Make sure each step has all the information \
needed. Reply with a numbered list of steps only.";

pub fn executor_system(tools: &ToolRegistry) -> String {
    format!(
        "\
You are executing one step of a larger plan. You run in a loop of Thought, Action, PAUSE, Observation.

Reply in exactly one of these two shapes:

Thought: <your reasoning>
Action: <tool>: <input>
PAUSE

or, once the step is complete:

Thought: <your reasoning>
Answer: <the result of this step>

Available tools:
{}",
        tools.descriptions()
    )
}

pub fn executor_request(
    question: &str,
    remaining: &[String],
    past_steps: &[(String, String)],
    step: &str,
) -> String {
    let mut out = format!("Objective: {question}\n\n");
    if !past_steps.is_empty() {
        out.push_str("Completed steps:\n");
        out.push_str(&render_past_steps(past_steps));
        out.push_str("\n\n");
    }
    if !remaining.is_empty() {
        out.push_str("Remaining plan after this step:\n");
        out.push_str(&render_numbered(remaining));
        out.push_str("\n\n");
    }
    out.push_str(&format!("Your current step: {step}"));
    out
}

pub const REPLANNER_SYSTEM: &str = "\
You update plans. Given the objective, the original plan and the steps executed so far, decide what \
to do next. If the objective is achieved, reply with \"DONE: <final answer>\" and nothing else. \
Otherwise reply with a numbered list of the remaining steps only. Do not repeat steps that are \
already done.";

pub fn replan_request(
    question: &str,
    original_plan: &[String],
    past_steps: &[(String, String)],
) -> String {
    format!(
        "Objective: {question}\n\nOriginal plan:\n{}\n\nSteps executed so far:\n{}",
        render_numbered(original_plan),
        render_past_steps(past_steps)
    )
}

fn render_numbered(steps: &[String]) -> String {
    steps
        .iter()
        .enumerate()
        .map(|(i, s)| format!("{}. {}", i + 1, s))
        .collect::<Vec<_>>()
        .join("\n")
}

fn render_past_steps(past_steps: &[(String, String)]) -> String {
    past_steps
        .iter()
        .map(|(step, result)| format!("Step: {step}\nResult: {result}"))
        .collect::<Vec<_>>()
        .join("\n\n")
}
